//! Control UI — the operator console document, embedded at build time.
//!
//! Uses `rust-embed` to bake the `ui/` directory into the binary. In debug
//! mode (`debug-embed` feature), the file is read from disk so you can edit
//! the markup and just refresh the browser.

use std::borrow::Cow;

use rust_embed::Embed;

#[derive(Embed)]
#[folder = "ui/"]
struct UiAssets;

/// The control-UI document bytes, or `None` if the asset is unavailable.
///
/// The gateway gates access to this and maps `None` to its 500 path; this
/// crate deliberately knows nothing about tokens.
pub fn control_document() -> Option<Cow<'static, [u8]>> {
    UiAssets::get("index.html").map(|file| file.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_embedded() {
        let doc = control_document().expect("index.html must be embedded");
        let text = std::str::from_utf8(&doc).unwrap();
        assert!(text.contains("<html"));
    }
}
