use pretty_assertions::assert_eq;
use preview_engine::{
    choose_strategy, ContentKind, ExtractedPage, FailureKind, FetchError, FetchMetadata,
    FetchOutput, FetchResult, Metadata, RenderReason, Strategy, StrategyInputs,
};

fn output(content_type: Option<&str>, disposition: Option<&str>) -> FetchResult {
    Ok(FetchOutput {
        bytes: b"body".to_vec(),
        metadata: FetchMetadata {
            original_url: "https://example.com/".to_string(),
            final_url: "https://example.com/".to_string(),
            redirect_count: 0,
            content_type: content_type.map(str::to_string),
            content_disposition: disposition.map(str::to_string),
            byte_len: 4,
        },
    })
}

fn page(body_text_len: usize, is_challenge: bool) -> ExtractedPage {
    ExtractedPage {
        metadata: Metadata {
            url: "https://example.com/".to_string(),
            title: Some("Example".to_string()),
            description: None,
            favicon_url: None,
        },
        body_text_len,
        is_challenge,
    }
}

fn inputs(page: Option<&ExtractedPage>) -> StrategyInputs<'_> {
    StrategyInputs {
        force_render: false,
        min_body_text_len: 200,
        page,
    }
}

fn failed(kind: FailureKind) -> FetchResult {
    Err(FetchError::new(kind, "test"))
}

#[test]
fn server_answers_are_final() {
    for kind in [
        FailureKind::HttpStatus(404),
        FailureKind::HttpStatus(500),
        FailureKind::InvalidUrl,
        FailureKind::TooLarge {
            max_bytes: 10,
            actual: Some(20),
        },
        FailureKind::Cancelled,
    ] {
        assert_eq!(
            choose_strategy(&failed(kind.clone()), &inputs(None)),
            Strategy::Fail(kind)
        );
    }
}

#[test]
fn transport_failures_fall_back_to_render() {
    for kind in [
        FailureKind::Network,
        FailureKind::Timeout,
        FailureKind::TooManyRedirects,
    ] {
        assert_eq!(
            choose_strategy(&failed(kind.clone()), &inputs(None)),
            Strategy::Render(RenderReason::FetchFailed(kind))
        );
    }
}

#[test]
fn substantial_html_is_accepted() {
    let full = page(1_000, false);
    assert_eq!(
        choose_strategy(&output(Some("text/html; charset=utf-8"), None), &inputs(Some(&full))),
        Strategy::AcceptContent(ContentKind::Html)
    );
}

#[test]
fn near_empty_and_challenge_pages_are_rendered() {
    let shell = page(12, false);
    assert_eq!(
        choose_strategy(&output(Some("text/html"), None), &inputs(Some(&shell))),
        Strategy::Render(RenderReason::NearEmpty { body_text_len: 12 })
    );

    let challenge = page(1_000, true);
    assert_eq!(
        choose_strategy(&output(Some("text/html"), None), &inputs(Some(&challenge))),
        Strategy::Render(RenderReason::Challenge)
    );
}

#[test]
fn forced_render_wins_over_good_html() {
    let full = page(1_000, false);
    let forced = StrategyInputs {
        force_render: true,
        ..inputs(Some(&full))
    };
    assert_eq!(
        choose_strategy(&output(Some("text/html"), None), &forced),
        Strategy::Render(RenderReason::Forced)
    );
}

#[test]
fn images_and_downloads_are_sniffed() {
    assert_eq!(
        choose_strategy(&output(Some("image/png"), None), &inputs(None)),
        Strategy::AcceptContent(ContentKind::Image)
    );
    assert_eq!(
        choose_strategy(&output(Some("application/pdf"), None), &inputs(None)),
        Strategy::Fail(FailureKind::UnsupportedContent {
            content_type: "application/pdf".to_string()
        })
    );
    assert_eq!(
        choose_strategy(
            &output(Some("text/html"), Some("attachment; filename=\"a.html\"")),
            &inputs(None)
        ),
        Strategy::Fail(FailureKind::UnsupportedContent {
            content_type: "text/html".to_string()
        })
    );
}
