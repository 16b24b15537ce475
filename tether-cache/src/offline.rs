//! Responses produced when neither network nor cache can answer.

use serde_json::json;

use crate::response::CacheResponse;

/// Key of the pre-cached offline page in the app-shell partition.
pub const OFFLINE_PAGE_KEY: &str = "/offline.html";

/// Message of the synthetic API response.
pub const OFFLINE_MESSAGE: &str = "No network connection available";

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Offline</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            background: #1a1a2e;
            color: #eee;
            display: flex;
            align-items: center;
            justify-content: center;
            min-height: 100vh;
            margin: 0;
            text-align: center;
        }
        .container { max-width: 400px; padding: 2rem; }
        h1 { color: #4fc3f7; margin-bottom: 1rem; }
        p { color: #aaa; line-height: 1.6; }
        button {
            background: #4fc3f7;
            color: #1a1a2e;
            border: none;
            padding: 0.75rem 1.5rem;
            border-radius: 6px;
            cursor: pointer;
            font-weight: bold;
            margin-top: 1rem;
        }
    </style>
</head>
<body>
    <div class="container">
        <h1>You are offline</h1>
        <p>The server cannot be reached right now. Cached pages are still available.</p>
        <p>Commands you send are queued and delivered once the connection returns.</p>
        <button onclick="window.location.reload()">Try again</button>
    </div>
</body>
</html>
"#;

/// The offline page written into the app-shell partition on install.
#[must_use]
pub fn offline_page() -> CacheResponse {
    CacheResponse::html(OFFLINE_PAGE)
}

/// 503 answer for API requests with no cached copy.
#[must_use]
pub fn api_unavailable() -> CacheResponse {
    CacheResponse::json(
        503,
        &json!({
            "error": "Offline",
            "message": OFFLINE_MESSAGE,
            "cached": false,
        }),
    )
}

/// Answer for a page navigation when the offline page itself is missing.
#[must_use]
pub fn document_fallback() -> CacheResponse {
    CacheResponse::text(200, "Offline")
}

/// Answer for every other request.
#[must_use]
pub fn not_found() -> CacheResponse {
    CacheResponse::text(404, "Not Found")
}
