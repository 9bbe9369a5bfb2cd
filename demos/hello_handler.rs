use handler_http::{
    hello::HelloHandler,
    url_rule::{UrlMatcher, DEFAULT_HOST},
    App, Result,
};

pub fn main() -> Result<()> {
    env_logger::init();
    App::new()
        .set_listen_ip("0.0.0.0")
        .set_port(8080)
        .handler("hello", HelloHandler)
        .rule(DEFAULT_HOST, UrlMatcher::Any, &["hello"])
        .run()
}
