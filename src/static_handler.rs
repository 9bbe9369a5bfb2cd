use std::{
    fs::{self, File, Metadata},
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    time::SystemTime,
};

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use log::debug;

use crate::{
    handler::HttpHandler,
    registry::HandlerOptions,
    request::{url_decode, Request, RequestMethod},
    response::{Response, Status, HTML_NEW_LINE},
    ConfigError,
};

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Serves files below a document root.
#[derive(Debug, Clone)]
pub struct StaticHandler {
    doc_root: PathBuf,
    // Directory holding `<code>.html` error pages.
    error_root: Option<PathBuf>,
    allow_index: bool,
    index_page_css: Option<String>,
}

impl StaticHandler {
    pub fn new(doc_root: &Path) -> Self {
        Self {
            doc_root: doc_root.to_path_buf(),
            error_root: None,
            allow_index: true,
            index_page_css: None,
        }
    }

    pub fn set_error_root(mut self, error_root: &Path) -> Self {
        self.error_root = Some(error_root.to_path_buf());
        self
    }

    pub fn set_allow_index(mut self, allow_index: bool) -> Self {
        self.allow_index = allow_index;
        self
    }

    pub fn set_index_page_css(mut self, href: &str) -> Self {
        self.index_page_css = Some(href.to_string());
        self
    }

    pub fn from_options(options: &HandlerOptions) -> Result<Box<dyn HttpHandler>, ConfigError> {
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
        Ok(Box::new(Self {
            doc_root: PathBuf::from(options.get_str("doc_root", "/var/www")),
            error_root: non_empty(options.get_str("error_root", "")).map(PathBuf::from),
            allow_index: options.get_bool("allow_index", true)?,
            index_page_css: non_empty(options.get_str("index_page_css", "")),
        }))
    }

    fn respond_file(
        &self,
        path: &Path,
        metadata: &Metadata,
        request: &Request,
        response: &mut Response,
    ) {
        let modified = metadata.modified().ok();
        if let (Some(modified), Some(since)) = (
            modified,
            request
                .find_header_value("If-Modified-Since")
                .and_then(parse_http_date),
        ) {
            if DateTime::<Utc>::from(modified).timestamp() <= since.timestamp() {
                response.respond_status(&Status::NOT_MODIFIED);
                return;
            }
        }

        let file_size = metadata.len();
        let (offset, length, status) = match request.find_header_value("Range") {
            Some(range) => match parse_range(range, file_size) {
                Some((offset, length)) => {
                    response.add_header(
                        "Content-Range",
                        &format!("bytes {}-{}/{}", offset, offset + length - 1, file_size),
                    );
                    (offset, length, Status::PARTIAL_CONTENT)
                }
                None => {
                    self.respond_error(&Status::REQUESTED_RANGE_NOT_SATISFIABLE, request, response);
                    return;
                }
            },
            None => (0, file_size, Status::OK),
        };

        response.add_header("Content-Type", content_type(path));
        if let Some(modified) = modified {
            response.add_header("Last-Modified", &format_http_date(modified));
        }

        if request.method == RequestMethod::Head {
            response.omit_body();
            response.set_content_length(length);
            response.respond_status(&status);
            return;
        }

        match read_file_range(path, offset, length) {
            Ok(content) => {
                response.write(content);
                response.respond_status(&status);
            }
            Err(err) => {
                debug!("cannot read {}: {err}", path.display());
                self.respond_error(&Status::FORBIDDEN, request, response);
            }
        }
    }

    fn respond_directory_list(
        &self,
        path: &Path,
        href_path: &str,
        request: &Request,
        response: &mut Response,
    ) {
        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("cannot list {}: {err}", path.display());
                self.respond_error(&Status::FORBIDDEN, request, response);
                return;
            }
        };
        let mut entries = entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let metadata = entry.metadata().ok()?;
                Some((entry.file_name().to_string_lossy().into_owned(), metadata))
            })
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let title = html_escape(href_path);
        let mut html = format!(
            "<html><head><meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\">\
             <title>Directory List {title}</title>{HTML_NEW_LINE}"
        );
        if let Some(css) = &self.index_page_css {
            let css = html_escape(css);
            html.push_str(&format!(
                "<link rel=\"stylesheet\" type=\"text/css\" href=\"{css}\"/>{HTML_NEW_LINE}"
            ));
        }
        html.push_str(&format!(
            "</head><body>{HTML_NEW_LINE}<h1>Index of {title}</h1>{HTML_NEW_LINE}<table>{HTML_NEW_LINE}"
        ));
        if href_path != "/" {
            html.push_str(&format!(
                "<tr class=\"parent\"><td><a href=\"..\">Parent Directory</a></td></tr>{HTML_NEW_LINE}"
            ));
        }
        for (name, metadata) in &entries {
            html.push_str(&directory_entry(name, metadata));
        }
        html.push_str(&format!("</table></body></html>{HTML_NEW_LINE}"));

        response.add_header("Content-Type", "text/html");
        if request.method == RequestMethod::Head {
            response.omit_body();
        }
        response.write(html);
        response.respond_status(&Status::OK);
    }

    /// Sends `error_root/<code>.html` when present, the built-in page otherwise.
    fn respond_error(&self, status: &Status, request: &Request, response: &mut Response) {
        if request.method == RequestMethod::Head {
            response.omit_body();
        }
        let page = self
            .error_root
            .as_ref()
            .map(|root| root.join(format!("{}.html", status.code)))
            .and_then(|page| fs::read(page).ok());
        match page {
            Some(page) => {
                response.add_header("Content-Type", "text/html");
                response.write(page);
                response.respond_status(status);
            }
            None => response.respond_with_message(status),
        }
    }
}

impl HttpHandler for StaticHandler {
    fn handle_request(&self, request: &Request, response: &mut Response) {
        if !matches!(
            request.method,
            RequestMethod::Get | RequestMethod::Post | RequestMethod::Head
        ) {
            self.respond_error(&Status::BAD_REQUEST, request, response);
            return;
        }

        let filename = remove_path_dots(&url_decode(request.path()));
        let requested_resource = self.doc_root.join(filename.trim_start_matches('/'));

        let metadata = match fs::metadata(&requested_resource) {
            Ok(metadata) => metadata,
            Err(_) => {
                debug!("Cannot stat file {}", requested_resource.display());
                self.respond_error(&Status::NOT_FOUND, request, response);
                return;
            }
        };

        if metadata.is_file() {
            self.respond_file(&requested_resource, &metadata, request, response);
        } else if metadata.is_dir() {
            let index = requested_resource.join("index.html");
            if let Ok(index_metadata) = fs::metadata(&index) {
                if index_metadata.is_file() {
                    self.respond_file(&index, &index_metadata, request, response);
                    return;
                }
            }
            if !filename.ends_with('/') {
                let (location, _) = request
                    .complete_uri
                    .split_once('?')
                    .unwrap_or((request.complete_uri.as_str(), ""));
                response.add_header("Location", &format!("{location}/"));
                response.respond_status(&Status::MOVED_PERMANENTLY);
            } else if self.allow_index {
                self.respond_directory_list(&requested_resource, &filename, request, response);
            } else {
                self.respond_error(&Status::FORBIDDEN, request, response);
            }
        } else {
            self.respond_error(&Status::FORBIDDEN, request, response);
        }
    }
}

/// Drops every `.` and `..` segment so the path cannot climb out of the
/// document root.
pub fn remove_path_dots(path: &str) -> String {
    let cleaned = path
        .split('/')
        .filter(|segment| *segment != "." && *segment != "..")
        .collect::<Vec<&str>>()
        .join("/");
    if cleaned.starts_with('/') {
        cleaned
    } else {
        format!("/{cleaned}")
    }
}

/// Single `bytes=a-b` or `bytes=a-` range as `(offset, length)`; `None` when
/// it cannot be satisfied for a file of `file_size` bytes.
fn parse_range(range_desc: &str, file_size: u64) -> Option<(u64, u64)> {
    let byte_range = range_desc.trim().strip_prefix("bytes=")?;
    let (start, end) = byte_range.split_once('-')?;
    let offset: u64 = start.trim().parse().ok()?;
    let length = match end.trim() {
        "" => file_size.checked_sub(offset)?,
        end => end.parse::<u64>().ok()?.checked_sub(offset)?.checked_add(1)?,
    };
    if length == 0 || offset.checked_add(length)? > file_size {
        return None;
    }
    Some((offset, length))
}

fn read_file_range(path: &Path, offset: u64, length: u64) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut content = Vec::with_capacity(length as usize);
    file.take(length).read_to_end(&mut content)?;
    Ok(content)
}

pub fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE_FORMAT).to_string()
}

pub fn parse_http_date(date: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(date.trim(), HTTP_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Escapes text for use in HTML content and double-quoted attributes.
fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn directory_entry(name: &str, metadata: &Metadata) -> String {
    let name = html_escape(name);
    let modified = metadata
        .modified()
        .map(|time| DateTime::<Local>::from(time).format("%F %T").to_string())
        .unwrap_or_default();
    if metadata.is_dir() {
        format!(
            "<tr class=\"directory\"><td><a href=\"{name}/\">{name}/</a></td><td>-</td><td>{modified}</td></tr>{HTML_NEW_LINE}"
        )
    } else {
        format!(
            "<tr class=\"regular\"><td><a href=\"{name}\">{name}</a></td><td>{}</td><td>{modified}</td></tr>{HTML_NEW_LINE}",
            metadata.len()
        )
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(extension) => match extension.to_ascii_lowercase().as_str() {
            "css" => "text/css",
            "js" => "text/javascript",
            "htm" | "html" => "text/html",
            "xml" => "text/xml",
            "txt" => "text/plain",
            "json" => "application/json",
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "avif" => "image/avif",
            "svg" => "image/svg+xml",
            "ico" => "image/vnd.microsoft.icon",
            _ => "application/octet-stream",
        },
        None => "application/octet-stream",
    }
}
