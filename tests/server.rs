use std::{
    fs,
    io::{Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    thread,
    time::Duration,
};

use handler_http::{hello::HELLO_BODY, App, HandlerRegistry, ServerConfig};

fn start(app: App) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || app.serve(listener));
    addr
}

/// Sends `raw` and reads until the server closes the connection.
fn exchange(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();
    let mut output = Vec::new();
    stream.read_to_end(&mut output).unwrap();
    String::from_utf8_lossy(&output).into_owned()
}

fn app_from_config(config: &str) -> App {
    let config: ServerConfig = config.parse().unwrap();
    App::from_config(&config, &HandlerRegistry::with_builtin_modules()).unwrap()
}

#[test]
fn hello_handler_answers_any_request() {
    let addr = start(app_from_config(
        r#"
[[handlers]]
name = "hello"
module = "hello"

[[hosts]]
domain = "default"
[[hosts.url_rules]]
type = "any"
chain = ["hello"]
"#,
    ));

    let output = exchange(
        addr,
        "GET /index HTTP/1.1\r\nHost: localhost\r\nUser-Agent: test-agent\r\nConnection: close\r\n\r\n",
    );
    assert!(output.starts_with("HTTP/1.1 200 OK\r\n"), "{output}");
    assert!(output.contains(&format!("Content-Length: {}\r\n", HELLO_BODY.len())));
    assert!(output.ends_with(HELLO_BODY));
}

#[test]
fn virtual_hosts_and_static_files() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("page.html"), "<p>static page</p>").unwrap();

    let addr = start(app_from_config(&format!(
        r#"
idle_timeout = 2

[[handlers]]
name = "files"
module = "static"
doc_root = "{}"

[[handlers]]
name = "hello"
module = "hello"

[[hosts]]
domain = "files.test"
[[hosts.url_rules]]
type = "prefix"
prefix = "/static"
chain = ["files"]

[[hosts]]
domain = "default"
[[hosts.url_rules]]
type = "any"
chain = ["hello"]
"#,
        root.path().display()
    )));

    let output = exchange(
        addr,
        "GET /static/page.html HTTP/1.1\r\nHost: files.test:80\r\nConnection: close\r\n\r\n",
    );
    assert!(output.starts_with("HTTP/1.1 200 OK\r\n"), "{output}");
    assert!(output.contains("Content-Type: text/html\r\n"));
    assert!(output.ends_with("<p>static page</p>"));

    let output = exchange(
        addr,
        "GET /static/page.html HTTP/1.1\r\nHost: elsewhere.test\r\nConnection: close\r\n\r\n",
    );
    assert!(output.ends_with(HELLO_BODY));

    let output = exchange(
        addr,
        "GET /nothing HTTP/1.1\r\nHost: files.test\r\nConnection: close\r\n\r\n",
    );
    assert!(output.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
    assert!(output.ends_with("This url is not configured."));
}

#[test]
fn keep_alive_then_close() {
    let addr = start(
        App::new()
            .handler("hello", handler_http::hello::HelloHandler)
            .rule(
                handler_http::url_rule::DEFAULT_HOST,
                handler_http::url_rule::UrlMatcher::Any,
                &["hello"],
            ),
    );

    let output = exchange(
        addr,
        "GET /1 HTTP/1.1\r\n\r\nHEAD /2 HTTP/1.1\r\n\r\nGET /3 HTTP/1.1\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(output.matches("HTTP/1.1 200 OK").count(), 3);
    // the HEAD response carries no body
    assert_eq!(output.matches(HELLO_BODY).count(), 2);
}

#[test]
fn idle_connections_are_closed() {
    let addr = start(
        App::new()
            .set_idle_timeout(Some(Duration::from_millis(200)))
            .handler("hello", handler_http::hello::HelloHandler)
            .rule(
                handler_http::url_rule::DEFAULT_HOST,
                handler_http::url_rule::UrlMatcher::Any,
                &["hello"],
            ),
    );

    let output = exchange(addr, "GET / HTTP/1.1\r\n\r\n");
    assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(output.ends_with(HELLO_BODY));
}
