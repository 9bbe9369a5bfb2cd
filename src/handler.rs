use crate::{request::Request, response::Response};

/// A unit of code the server invokes once per request.
///
/// A handler either finalizes `response` with one of the `respond*` calls or
/// leaves it untouched so the next handler of the chain gets a turn.
pub trait HttpHandler: Send + Sync {
    fn handle_request(&self, request: &Request, response: &mut Response);
}

impl<F> HttpHandler for F
where
    F: Fn(&Request, &mut Response) + Send + Sync,
{
    fn handle_request(&self, request: &Request, response: &mut Response) {
        self(request, response)
    }
}
