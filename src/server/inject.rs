//! Reload-script injection into HTML responses.
//!
//! The script tag is inserted at the first position in this ladder:
//! before `</head>`, after a `<script type=importmap>` block, after
//! `</title>`, before `</body>`, before `</html>`, after
//! `<!doctype html>`, or appended to the end. The append fallback means
//! injection never silently drops the script, even for fragment or
//! in-progress documents with none of those tags.

use crate::config::ServerConfig;

/// Build the module script tag pointing into the virtual scripts folder.
pub fn script_tag(config: &ServerConfig) -> String {
    format!(
        r#"<script type="module" src="/{}/reload-client.js"></script>"#,
        config.injected_scripts_folder
    )
}

/// Inject the reload client script tag into an HTML document.
pub fn augment_html(content: String, config: &ServerConfig) -> String {
    let script = script_tag(config);

    if let Some(idx) = content.find("</head>") {
        return splice(content, idx, &script);
    }

    // An import map must precede any module script that relies on it.
    if let Some(idx) = importmap_end(&content) {
        return splice(content, idx, &script);
    }

    // <title> is the only required element in an HTML document.
    if let Some(idx) = content.find("</title>") {
        return splice(content, idx + "</title>".len(), &script);
    }

    // Below here the document is malformed; stay forgiving, the author
    // is probably mid-edit.
    if let Some(idx) = content.find("</body>") {
        return splice(content, idx, &script);
    }
    if let Some(idx) = content.find("</html>") {
        return splice(content, idx, &script);
    }
    if let Some(idx) = content.find("<!doctype html>") {
        return splice(content, idx + "<!doctype html>".len(), &script);
    }

    // Works without content at all.
    let mut content = content;
    content.push_str(&script);
    content
}

fn splice(mut content: String, idx: usize, script: &str) -> String {
    content.insert_str(idx, script);
    content
}

/// Find the end of a `<script type=importmap>...</script>` block, if any.
/// The type attribute value may be quoted or bare.
fn importmap_end(content: &str) -> Option<usize> {
    let lower = content.to_ascii_lowercase();
    let mut search_from = 0;
    while let Some(open_rel) = lower[search_from..].find("<script") {
        let open = search_from + open_rel;
        let tag_end = match lower[open..].find('>') {
            Some(end) => open + end,
            None => return None,
        };
        let tag = &lower[open..tag_end];
        let is_importmap = tag.contains("type=importmap")
            || tag.contains("type=\"importmap\"")
            || tag.contains("type='importmap'");
        let close = match lower[tag_end..].find("</script>") {
            Some(rel) => tag_end + rel + "</script>".len(),
            None => return None,
        };
        if is_importmap {
            return Some(close);
        }
        search_from = close;
    }
    None
}
