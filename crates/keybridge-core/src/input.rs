use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use url::Url;

use crate::error::{Error, Result};

/// A credential request as written by Git on standard input: a block of
/// `key=value` lines terminated by a blank line (or end of stream).
///
/// `protocol` and `host` are required for provider matching; everything else
/// is optional and provider-specific.
#[derive(Debug, Clone, Default)]
pub struct InputRequest {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub path: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl InputRequest {
    /// Parse a request block from a reader.
    pub fn read_from(mut reader: impl BufRead) -> Result<Self> {
        let mut request = Self::default();
        let mut line = String::new();

        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if read == 0 || trimmed.is_empty() {
                break;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(Error::InvalidInput(format!(
                    "malformed input line '{trimmed}'"
                )));
            };

            request.set(key, value);
        }

        Ok(request)
    }

    /// Build a request from key/value pairs. Primarily for tests and
    /// programmatic callers.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut request = Self::default();
        for (key, value) in pairs {
            request.set(key, value);
        }
        request
    }

    fn set(&mut self, key: &str, value: &str) {
        match key {
            "protocol" => self.protocol = Some(value.to_string()),
            "host" => self.host = Some(value.to_string()),
            "path" => self.path = Some(value.to_string()),
            "username" => self.username = Some(value.to_string()),
            "password" => self.password = Some(value.to_string()),
            _ => {
                self.extra.insert(key.to_string(), value.to_string());
            }
        }
    }

    /// The absolute remote URL this request refers to.
    ///
    /// Fails with [`Error::InvalidInput`] when `protocol` or `host` is
    /// missing or the combination does not form a valid URL.
    pub fn remote_url(&self) -> Result<Url> {
        let protocol = self
            .protocol
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::InvalidInput("'protocol' is required".to_string()))?;
        let host = self
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidInput("'host' is required".to_string()))?;

        let mut raw = format!("{protocol}://{host}/");
        if let Some(path) = self.path.as_deref() {
            raw.push_str(path.trim_start_matches('/'));
        }

        Url::parse(&raw)
            .map_err(|e| Error::InvalidInput(format!("cannot form a remote URL from input: {e}")))
    }
}

/// Write a `key=value` response block, terminated by a blank line.
pub fn write_pairs(mut writer: impl Write, pairs: &[(&str, &str)]) -> Result<()> {
    for (key, value) in pairs {
        writeln!(writer, "{key}={value}")?;
    }
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_block_until_blank_line() {
        let block = "protocol=https\nhost=example.com\npath=foo/bar\nwwwauth=Basic realm=x\n\nignored=tail\n";
        let request = InputRequest::read_from(block.as_bytes()).unwrap();

        assert_eq!(request.protocol.as_deref(), Some("https"));
        assert_eq!(request.host.as_deref(), Some("example.com"));
        assert_eq!(request.path.as_deref(), Some("foo/bar"));
        assert_eq!(request.extra.get("wwwauth").unwrap(), "Basic realm=x");
        assert!(!request.extra.contains_key("ignored"));
    }

    #[test]
    fn value_may_contain_equals() {
        let request = InputRequest::read_from("password=a=b=c\n\n".as_bytes()).unwrap();
        assert_eq!(request.password.as_deref(), Some("a=b=c"));
    }

    #[test]
    fn malformed_line_is_invalid_input() {
        let result = InputRequest::read_from("not a pair\n\n".as_bytes());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn remote_url_requires_protocol_and_host() {
        let request = InputRequest::from_pairs([("host", "example.com")]);
        assert!(matches!(request.remote_url(), Err(Error::InvalidInput(_))));

        let request = InputRequest::from_pairs([("protocol", "https")]);
        assert!(matches!(request.remote_url(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn remote_url_joins_path() {
        let request = InputRequest::from_pairs([
            ("protocol", "https"),
            ("host", "dev.azure.com"),
            ("path", "org/proj/_git/repo"),
        ]);
        assert_eq!(
            request.remote_url().unwrap().as_str(),
            "https://dev.azure.com/org/proj/_git/repo"
        );
    }

    #[test]
    fn writes_response_block() {
        let mut out = Vec::new();
        write_pairs(&mut out, &[("username", "alice"), ("password", "p")]).unwrap();
        assert_eq!(out, b"username=alice\npassword=p\n\n");
    }
}
