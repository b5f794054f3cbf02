//! Helpers for reading print service responses

const MAX_BODY_EXCERPT: usize = 200;

/// Parses and validates a response Content-Type for application/json
///
/// Accepts:
/// - `application/json`
/// - `application/json;charset=utf-8`
///
/// Rejects anything else, including `text/html` error pages served by proxies
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, String> {
    let media_type: mime::Mime = content_type
        .parse()
        .map_err(|_| format!("invalid Content-Type: {}", content_type))?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(format!(
            "expected application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        ));
    }

    Ok(media_type)
}

/// First characters of an error body, on a single line
pub fn body_excerpt(body: &str) -> String {
    let flat: String = body
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let trimmed = flat.trim();
    if trimmed.chars().count() <= MAX_BODY_EXCERPT {
        return trimmed.to_string();
    }
    let mut excerpt: String = trimmed.chars().take(MAX_BODY_EXCERPT).collect();
    excerpt.push_str("...");
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_type_valid() {
        assert!(parse_content_type("application/json").is_ok());
        assert!(parse_content_type("application/json;charset=utf-8").is_ok());
        assert!(parse_content_type("application/json; charset=UTF-8").is_ok());
    }

    #[test]
    fn test_parse_content_type_invalid() {
        assert!(parse_content_type("text/html").is_err());
        assert!(parse_content_type("application/jsonp").is_err());
        assert!(parse_content_type("not a mime").is_err());
    }

    #[test]
    fn test_body_excerpt() {
        assert_eq!(body_excerpt("  Layout\nnot found \n"), "Layout not found");

        let long = "x".repeat(500);
        let excerpt = body_excerpt(&long);
        assert_eq!(excerpt.len(), MAX_BODY_EXCERPT + 3);
        assert!(excerpt.ends_with("..."));
    }
}
