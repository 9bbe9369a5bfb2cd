use std::path::Path;

use handler_http::{App, Result};

pub fn main() -> Result<()> {
    env_logger::init();
    App::new()
        .set_listen_ip("0.0.0.0")
        .set_port(8080)
        .set_compression(true)
        .static_folder("/", Path::new("./public"))
        .run()
}
