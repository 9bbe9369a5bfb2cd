use std::{collections::HashMap, sync::Arc};

use regex::Regex;

use crate::{handler::HttpHandler, request::Request};

pub const DEFAULT_HOST: &str = "default";

pub type HandlerChain = Vec<Arc<dyn HttpHandler>>;

#[derive(Debug, Clone)]
pub enum UrlMatcher {
    Any,
    /// Matches a path prefix and strips it from the request.
    Prefix(String),
    /// Must match the whole uri.
    Regex(Regex),
}

impl UrlMatcher {
    /// Anchors `pattern` so it has to cover the whole uri.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(UrlMatcher::Regex(Regex::new(&format!("^(?:{pattern})$"))?))
    }

    pub fn matches(&self, request: &mut Request) -> bool {
        match self {
            UrlMatcher::Any => true,
            UrlMatcher::Prefix(prefix) => {
                if !request.path.starts_with(prefix.as_str()) {
                    return false;
                }
                request.strip_prefix(prefix);
                true
            }
            UrlMatcher::Regex(regex) => regex.is_match(&request.uri),
        }
    }
}

pub struct UrlRule {
    pub matcher: UrlMatcher,
    pub chain: HandlerChain,
}

impl UrlRule {
    pub fn new(matcher: UrlMatcher, chain: HandlerChain) -> Self {
        Self { matcher, chain }
    }
}

/// Url rules of one host, tried in declaration order.
#[derive(Default)]
pub struct UrlRules {
    rules: Vec<UrlRule>,
}

impl UrlRules {
    pub fn push(&mut self, rule: UrlRule) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn match_request(&self, request: &mut Request) -> Option<&UrlRule> {
        let total = self.rules.len();
        self.rules.iter().enumerate().find_map(|(i, rule)| {
            log::debug!("matching uri {}/{}", i, total);
            rule.matcher.matches(request).then_some(rule)
        })
    }
}

#[derive(Default)]
pub struct VirtualHosts {
    hosts: HashMap<String, UrlRules>,
}

impl VirtualHosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules_mut(&mut self, domain: &str) -> &mut UrlRules {
        self.hosts.entry(domain.to_lowercase()).or_default()
    }

    /// Picks the rules for the `Host` header (port ignored), falling back to
    /// [`DEFAULT_HOST`], and returns the first rule matching the request.
    pub fn match_request(&self, request: &mut Request) -> Option<&UrlRule> {
        let host = request
            .find_header_value("Host")
            .map(parse_host)
            .unwrap_or_default();
        let rules = self
            .hosts
            .get(&host)
            .or_else(|| self.hosts.get(DEFAULT_HOST))?;
        rules.match_request(request)
    }
}

fn parse_host(host: &str) -> String {
    let host = host.trim();
    // bracketed IPv6 literals carry colons of their own
    let without_port = match host.rfind(':') {
        Some(pos) if !host[pos..].contains(']') => &host[..pos],
        _ => host,
    };
    without_port.to_lowercase()
}
