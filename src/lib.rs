pub mod config;
pub mod error;
pub mod handler;
pub mod hello;
pub mod registry;
pub mod request;
pub mod static_handler;
pub mod url_rule;

pub use handler_http_response as response;

use std::{
    collections::HashMap,
    io::{BufReader, Read, Write},
    net::{TcpListener, TcpStream},
    path::Path,
    sync::Arc,
    thread,
    time::Duration,
};

use flate2::{write::GzEncoder, Compression};
use log::{debug, info, trace, warn};

pub use config::ServerConfig;
pub use error::{ConfigError, ParseError, ServerError};
pub use handler::HttpHandler;
pub use registry::{HandlerOptions, HandlerRegistry};
use request::{Request, RequestMethod};
use response::{Response, Status};
use static_handler::StaticHandler;
use url_rule::{HandlerChain, UrlMatcher, UrlRule, VirtualHosts, DEFAULT_HOST};

pub type Result<T> = std::result::Result<T, ServerError>;

pub struct App {
    handlers: HashMap<String, Arc<dyn HttpHandler>>,
    hosts: VirtualHosts,
    port: u16,
    listen_ip: String,
    idle_timeout: Option<Duration>,
    compression: bool,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            hosts: VirtualHosts::new(),
            port: config::DEFAULT_PORT,
            listen_ip: config::DEFAULT_ADDRESS.into(),
            idle_timeout: Some(Duration::from_secs(config::DEFAULT_IDLE_TIMEOUT_SECS)),
            compression: false,
        }
    }

    /// Instantiates the configured handlers through `registry` and wires
    /// them into the configured hosts.
    pub fn from_config(
        config: &ServerConfig,
        registry: &HandlerRegistry,
    ) -> std::result::Result<Self, ConfigError> {
        let mut app = App::new()
            .set_listen_ip(&config.address)
            .set_port(config.port)
            .set_idle_timeout(
                (config.idle_timeout > 0).then(|| Duration::from_secs(config.idle_timeout)),
            )
            .set_compression(config.compression);

        for handler_config in &config.handlers {
            if app.handlers.contains_key(&handler_config.name) {
                warn!(
                    "handler instance {} defined twice, keeping the first",
                    handler_config.name
                );
                continue;
            }
            let handler =
                registry.create(&handler_config.module, &handler_config.handler_options())?;
            app.handlers
                .insert(handler_config.name.clone(), Arc::from(handler));
        }

        for host in &config.hosts {
            for rule in &host.url_rules {
                app = app.rule(&host.domain, rule.matcher()?, &rule.chain);
            }
        }
        Ok(app)
    }

    pub fn set_listen_ip(mut self, ip: &str) -> Self {
        self.listen_ip = ip.to_string();
        self
    }

    pub fn set_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `None` or a zero duration disables the idle timeout.
    pub fn set_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout.filter(|timeout| !timeout.is_zero());
        self
    }

    pub fn set_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    /// Registers a named handler instance for use in rule chains.
    pub fn handler<H>(mut self, name: &str, handler: H) -> Self
    where
        H: HttpHandler + 'static,
    {
        if self.handlers.contains_key(name) {
            warn!("handler instance {name} defined twice, keeping the first");
            return self;
        }
        self.handlers.insert(name.to_string(), Arc::new(handler));
        self
    }

    /// Appends a url rule to `domain`. Unknown handler names are skipped.
    pub fn rule(mut self, domain: &str, matcher: UrlMatcher, chain: &[impl AsRef<str>]) -> Self {
        let chain: HandlerChain = chain
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                let handler = self.handlers.get(name).cloned();
                if handler.is_none() {
                    warn!("Cannot find handler instance {name}");
                }
                handler
            })
            .collect();
        self.hosts
            .rules_mut(domain)
            .push(UrlRule::new(matcher, chain));
        self
    }

    /// Serves `folder_path` below `pathname` on the default host.
    pub fn static_folder(self, pathname: &str, folder_path: &Path) -> Self {
        let name = format!("static:{pathname}");
        self.handler(&name, StaticHandler::new(folder_path)).rule(
            DEFAULT_HOST,
            UrlMatcher::Prefix(pathname.to_string()),
            &[name.as_str()],
        )
    }

    pub(crate) fn is_compression_supported(compression_str: &str) -> bool {
        compression_str
            .split(',')
            .map(|v| v.split(';').next().unwrap_or_default().trim())
            .any(|scheme| scheme.eq_ignore_ascii_case("gzip"))
    }

    pub(crate) fn compress(input: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(input)?;
        encoder.finish()
    }

    /// Runs the request through the url rules and the matched handler chain.
    pub fn dispatch(&self, request: &mut Request) -> Response {
        let mut response = Response::new();
        if request.method == RequestMethod::Head {
            response.omit_body();
        }

        let Some(rule) = self.hosts.match_request(request) else {
            response.write("This url is not configured.");
            response.respond_status(&Status::SERVICE_UNAVAILABLE);
            return response;
        };

        for handler in &rule.chain {
            handler.handle_request(request, &mut response);
            if response.is_responded() {
                break;
            }
        }
        if !response.is_responded() {
            response.respond_with_message(&Status::SERVICE_UNAVAILABLE);
        }

        if self.compression {
            self.compress_response(request, &mut response);
        }
        response
    }

    fn compress_response(&self, request: &Request, response: &mut Response) {
        let accepts_gzip = request
            .find_header_values("Accept-Encoding")
            .into_iter()
            .any(App::is_compression_supported);
        let status = response.status().map(|s| s.code);
        if !accepts_gzip
            || status != Some(200)
            || response.body().is_empty()
            || response.find_header("Content-Encoding").is_some()
        {
            return;
        }
        match App::compress(response.body()) {
            Ok(compressed) => {
                response.add_header("Content-Encoding", "gzip");
                response.set_body_bytes(compressed);
            }
            Err(err) => warn!("gzip failed, sending identity body: {err}"),
        }
    }

    /// Serves requests from one connection until the client stops asking for
    /// keep-alive, goes idle, or sends something unparsable.
    pub fn serve_connection<S: Read + Write>(&self, stream: S) -> Result<()> {
        let mut reader = BufReader::new(stream);
        loop {
            let mut request = match Request::parse(&mut reader) {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(err) if err.is_disconnect() => {
                    debug!("closing connection: {err}");
                    return Ok(());
                }
                Err(err) => {
                    warn!("corrupted protocol, closing: {err}");
                    let mut response = Response::new();
                    response.add_header("Connection", "close");
                    response.respond_with_message(&err.status());
                    reader.get_mut().write_all(&response.to_bytes())?;
                    reader.get_mut().flush()?;
                    return Err(err.into());
                }
            };

            trace!("{} {}", request.method, request.complete_uri);
            let keep_alive = request.keep_alive();
            let mut response = self.dispatch(&mut request);
            if !keep_alive {
                response.add_header("Connection", "close");
            } else if request.version_minor == 0 {
                response.add_header("Connection", "keep-alive");
            }

            let stream = reader.get_mut();
            stream.write_all(&response.to_bytes())?;
            stream.flush()?;

            if !keep_alive {
                debug!("active close after transfer finish");
                return Ok(());
            }
        }
    }

    /// Accepts connections on `listener`, one thread per connection.
    pub fn serve(self, listener: TcpListener) -> Result<()> {
        let app = Arc::new(self);
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("accept failed: {err}");
                    continue;
                }
            };
            App::spawn_connection(&app, stream);
        }
        Ok(())
    }

    fn spawn_connection(app: &Arc<App>, stream: TcpStream) {
        if let Err(err) = stream.set_read_timeout(app.idle_timeout) {
            warn!("cannot set idle timeout, dropping connection: {err}");
            return;
        }
        let app = app.clone();
        thread::spawn(move || {
            let peer = stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_default();
            if let Err(err) = app.serve_connection(stream) {
                debug!("connection {peer} ended with error: {err}");
            }
        });
    }

    pub fn run(self) -> Result<()> {
        let listener = TcpListener::bind(format!("{}:{}", self.listen_ip, self.port))?;
        info!("listening on {}", listener.local_addr()?);
        self.serve(listener)
    }
}
