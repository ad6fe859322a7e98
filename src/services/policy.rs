//! Content-type and cache-control policy.
//!
//! Content type is resolved from the key's file extension. TypeScript
//! sources are special-cased ahead of the general lookup table, which does
//! not know about `.ts`/`.tsx` (a plain table would call `.ts` an MPEG
//! transport stream). Anything neither knows falls back to octet-stream.
//!
//! HTML and JSON are deployment entry points and must never be cached;
//! everything else the pipeline writes is content-addressed and therefore
//! immutable, so it gets a ten-year max-age.

/// Directives for volatile content: disable caching everywhere, including
/// shared/edge caches.
pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate, max-age=0, s-maxage=0";

/// Ten-year max-age for fingerprinted content.
pub const LONG_LIVED: &str = "max-age=315360000";

/// Content-type substrings that force the no-cache directive.
const VOLATILE_TYPES: [&str; 2] = ["text/html", "application/json"];

/// Text after the final `.` of the key. A key without a dot yields the key
/// itself, which falls through to the octet-stream fallback.
pub fn extension(key: &str) -> &str {
    match key.rfind('.') {
        Some(idx) => &key[idx + 1..],
        None => key,
    }
}

/// Resolve a content type for a key.
pub fn content_type_for_key(key: &str) -> &'static str {
    match extension(key) {
        "ts" => "text/typescript",
        "tsx" => "text/tsx",
        ext => mime_for_extension(ext),
    }
}

/// Resolve the cache-control directive for a resolved content type.
pub fn cache_control_for(content_type: &str) -> &'static str {
    if VOLATILE_TYPES.iter().any(|v| content_type.contains(v)) {
        NO_CACHE
    } else {
        LONG_LIVED
    }
}

/// Extension to MIME type for the asset kinds a deploy bucket actually
/// sees. Unknown extensions are served as opaque binary.
fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" | "map" => "application/json",
        "webmanifest" => "application/manifest+json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/vnd.microsoft.icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}
