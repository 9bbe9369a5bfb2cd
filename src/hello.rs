use log::info;

use crate::{
    handler::HttpHandler,
    registry::HandlerOptions,
    request::Request,
    response::Response,
    ConfigError,
};

pub const HELLO_BODY: &str = "<html><body>hello world</body></html>";

/// Logs who asked for what and answers every request with the same page.
#[derive(Default)]
pub struct HelloHandler;

impl HelloHandler {
    pub fn from_options(_options: &HandlerOptions) -> Result<Box<dyn HttpHandler>, ConfigError> {
        Ok(Box::new(HelloHandler))
    }
}

impl HttpHandler for HelloHandler {
    fn handle_request(&self, request: &Request, response: &mut Response) {
        info!(
            "{} {}",
            request.uri(),
            request.find_header_value("User-Agent").unwrap_or("-")
        );
        response.write(HELLO_BODY);
        response.respond(200, "OK");
    }
}
