use reqwest::Url;

use autoprobe_core::api::DriverError;

/// Adds `default_scheme` when the endpoint has none and upgrades plain http
/// to https when `force_tls` is set. The result never ends with `/`.
pub fn normalise_server(
    server: &str,
    default_scheme: &str,
    force_tls: bool,
) -> Result<String, DriverError> {
    let server = server.trim();
    if server.is_empty() {
        return Err(DriverError::Connect(
            "automation server URL must not be empty".to_string(),
        ));
    }
    let with_scheme = if server.contains("://") {
        server.to_string()
    } else {
        format!("{default_scheme}://{server}")
    };
    let mut url = Url::parse(&with_scheme)
        .map_err(|e| DriverError::Connect(format!("invalid server URL '{server}': {e}")))?;
    if force_tls && url.scheme().eq_ignore_ascii_case("http") && url.set_scheme("https").is_err() {
        return Err(DriverError::Connect(format!(
            "cannot upgrade '{server}' to https"
        )));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// `server` with `/wd/hub` appended, unless it already ends with it.
pub fn append_wd_hub(server: &str) -> String {
    let trimmed = server.trim_end_matches('/');
    if trimmed.ends_with("wd/hub") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/wd/hub")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_scheme_and_strips_trailing_slash() {
        assert_eq!(
            normalise_server(" 127.0.0.1:4723/ ", "http", false).unwrap(),
            "http://127.0.0.1:4723"
        );
        assert_eq!(
            normalise_server("device-farm:443", "https", false).unwrap(),
            "https://device-farm"
        );
    }

    #[test]
    fn force_tls_upgrades_http_only() {
        assert_eq!(
            normalise_server("http://grid.local:4444/wd/hub", "http", true).unwrap(),
            "https://grid.local:4444/wd/hub"
        );
        assert_eq!(
            normalise_server("https://grid.local", "http", true).unwrap(),
            "https://grid.local"
        );
    }

    #[test]
    fn empty_server_is_rejected() {
        assert!(matches!(
            normalise_server("  ", "http", false),
            Err(DriverError::Connect(_))
        ));
    }

    #[test]
    fn wd_hub_is_appended_once() {
        assert_eq!(append_wd_hub("http://h:4723"), "http://h:4723/wd/hub");
        assert_eq!(append_wd_hub("http://h:4723/wd/hub/"), "http://h:4723/wd/hub");
    }
}
