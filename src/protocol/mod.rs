//! Wire-level pieces of the DBGp protocol: the command line parser and the
//! XML response serialization. Nothing in here touches session state.

pub mod error;
pub mod parser;
pub mod xml;

pub use error::ErrorCode;
pub use parser::{parse_command, Args, ParseError};
pub use xml::Node;

/// Files travel as `file://` URIs on the wire; pseudo-files (`dbgp://...`)
/// pass through untouched.
pub fn path_to_url(path: &str) -> String {
    if path.contains("://") {
        path.to_string()
    } else {
        format!("file://{path}")
    }
}

/// Inverse of [`path_to_url`]: a local path out of a client-supplied URI.
pub fn path_from_url(url: &str) -> String {
    url.strip_prefix("file://").unwrap_or(url).to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_path_url_mapping() {
        assert_eq!(path_to_url("/src/main.rs"), "file:///src/main.rs");
        assert_eq!(path_to_url("dbgp://3"), "dbgp://3");
        assert_eq!(path_from_url("file:///src/main.rs"), "/src/main.rs");
        assert_eq!(path_from_url("/src/main.rs"), "/src/main.rs");
        assert_eq!(path_from_url("dbgp://3"), "dbgp://3");
    }
}
