//! Utilities for generating HTTP responses on authentication failures

use http::{header, HeaderValue, Response, StatusCode};

/// Build a `401 Unauthorized` response whose body is the JSON object
/// `{"message": "{description}"}`
///
/// The description is repeated in the `www-authenticate` header, escaped
/// to make sure it is header-friendly:
///
/// ```http
/// HTTP/1.1 401 Unauthorized
/// www-authenticate: Bearer error="invalid_token" error_description="{description}"
/// content-type: application/json
/// ```
///
/// `error_description` is omitted if `description` is empty.
pub fn unauthorized_json<Body: From<String>>(description: &str) -> Response<Body> {
    let body = serde_json::json!({ "message": description }).to_string();

    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = StatusCode::UNAUTHORIZED;
    resp.headers_mut()
        .insert(header::WWW_AUTHENTICATE, invalid_token(description));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

fn invalid_token(description: &str) -> HeaderValue {
    if description.is_empty() {
        return HeaderValue::from_static(r#"Bearer error="invalid_token""#);
    }

    HeaderValue::try_from(format!(
        r#"Bearer error="invalid_token" error_description="{}""#,
        description.escape_default()
    ))
    .unwrap_or_else(|_| HeaderValue::from_static(r#"Bearer error="invalid_token""#))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn www_authenticate<B>(resp: &Response<B>) -> &str {
        resp.headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    #[test]
    fn unicode_and_non_printing_description_is_escaped() {
        let resp = unauthorized_json::<String>("\0\n\ttest™: \"Ĉu?\"");

        assert_eq!(
            www_authenticate(&resp),
            r#"Bearer error="invalid_token" error_description="\u{0}\n\ttest\u{2122}: \"\u{108}u?\"""#
        );
    }

    #[test]
    fn empty_description_is_omitted() {
        let resp = unauthorized_json::<String>("");

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(www_authenticate(&resp), r#"Bearer error="invalid_token""#);
    }

    #[test]
    fn json_body_carries_the_message() -> color_eyre::Result<()> {
        let resp = unauthorized_json::<String>("token expired");

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
        assert_eq!(
            www_authenticate(&resp),
            r#"Bearer error="invalid_token" error_description="token expired""#
        );

        let body: serde_json::Value = serde_json::from_str(resp.body())?;
        assert_eq!(body, serde_json::json!({ "message": "token expired" }));
        Ok(())
    }
}
