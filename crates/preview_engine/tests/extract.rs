use pretty_assertions::assert_eq;
use preview_engine::{decode_html, Extractor, HtmlMetadataExtractor, Metadata};

fn extract(html: &str, page_url: &str) -> Metadata {
    HtmlMetadataExtractor.extract(html, page_url).metadata
}

#[test]
fn reads_title_description_and_favicon() {
    let html = r#"<html><head>
        <title>  Example   Domain </title>
        <meta name="description" content="Illustrative examples.">
        <link rel="shortcut icon" href="/static/icon.png">
        </head><body><h1>Heading</h1></body></html>"#;

    assert_eq!(
        extract(html, "https://example.com/docs/page"),
        Metadata {
            url: "https://example.com/docs/page".to_string(),
            title: Some("Example Domain".to_string()),
            description: Some("Illustrative examples.".to_string()),
            favicon_url: Some("https://example.com/static/icon.png".to_string()),
        }
    );
}

#[test]
fn falls_back_to_open_graph_and_headings() {
    let og = r#"<html><head><meta property="og:title" content="OG Title">
        <meta property="og:description" content="OG description"></head>
        <body><h1>Ignored</h1></body></html>"#;
    let meta = extract(og, "https://example.com/");
    assert_eq!(meta.title.as_deref(), Some("OG Title"));
    assert_eq!(meta.description.as_deref(), Some("OG description"));

    let heading = "<html><head><title>   </title></head><body><h1></h1><h1>First real</h1></body></html>";
    assert_eq!(
        extract(heading, "https://example.com/").title.as_deref(),
        Some("First real")
    );
}

#[test]
fn favicon_defaults_to_root_path() {
    let meta = extract("<html><body>no links</body></html>", "https://example.com/a/b?c=d");
    assert_eq!(
        meta.favicon_url.as_deref(),
        Some("https://example.com/favicon.ico")
    );
}

#[test]
fn favicon_is_resolved_against_base_href() {
    let html = r#"<html><head><base href="https://cdn.example.net/assets/">
        <link rel="icon" href="fav.svg"></head></html>"#;
    assert_eq!(
        extract(html, "https://example.com/page").favicon_url.as_deref(),
        Some("https://cdn.example.net/assets/fav.svg")
    );
}

#[test]
fn inline_data_favicon_is_ignored() {
    let html = r#"<html><head><link rel="icon" href="data:image/png;base64,AAAA">
        <link rel="apple-touch-icon" href="/touch.png"></head></html>"#;
    assert_eq!(
        extract(html, "https://example.com/").favicon_url.as_deref(),
        Some("https://example.com/favicon.ico")
    );
}

#[test]
fn malformed_markup_yields_partial_metadata() {
    let meta = extract("<html><head><title>Broken<body><p>unterminated", "https://example.com/");
    assert_eq!(meta.description, None);
    assert!(meta.favicon_url.is_some());
}

#[test]
fn near_empty_and_challenge_pages_are_flagged() {
    let shell = r#"<html><head><title>App</title><script>window.boot()</script></head>
        <body><div id="root"></div><noscript>Enable JavaScript</noscript></body></html>"#;
    let page = HtmlMetadataExtractor.extract(shell, "https://app.example.com/");
    assert_eq!(page.body_text_len, 0);
    assert!(!page.is_challenge);

    let challenge = "<html><head><title>Just a moment...</title></head><body>Checking</body></html>";
    assert!(HtmlMetadataExtractor
        .extract(challenge, "https://example.com/")
        .is_challenge);
}

#[test]
fn legacy_charsets_are_decoded_before_extraction() {
    let bytes = b"<html><head><title>Caf\xe9 cr\xe8me</title></head></html>";
    let decoded = decode_html(bytes, Some("text/html; charset=ISO-8859-1"));
    let meta = extract(&decoded.html, "https://example.com/");
    assert_eq!(meta.title.as_deref(), Some("Caf\u{e9} cr\u{e8}me"));
}
