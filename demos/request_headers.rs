use handler_http::{
    request::Request,
    response::Response,
    url_rule::{UrlMatcher, DEFAULT_HOST},
    App, Result,
};

fn user_agent(request: &Request, response: &mut Response) {
    if let Some(user_agent) = request.find_header_value("User-Agent") {
        response.write(user_agent);
    }
    response.add_header("Content-Type", "text/plain");
    response.respond(200, "OK");
}

pub fn main() -> Result<()> {
    env_logger::init();
    App::new()
        .set_listen_ip("0.0.0.0")
        .set_port(8080)
        .handler("user-agent", user_agent)
        .rule(DEFAULT_HOST, UrlMatcher::Prefix("/user-agent".into()), &["user-agent"])
        .run()
}
