mod common;

use std::time::Duration;

use chonker_structurer::backend::ScriptedBackend;
use chonker_structurer::config::{CallConvention, StructurerConfig};
use chonker_structurer::edit::EditState;
use chonker_structurer::error::BackendFailureKind;
use chonker_structurer::extractor::StructuredExtractor;
use chonker_structurer::render::{DocumentRenderer, INITIAL_DOCUMENT};
use chonker_structurer::session::RevisionOrigin;
use chonker_structurer::{Session, StructurerError};

use common::{budget_workbook, QUARTERLY_PAYLOAD};

fn session_with(convention: CallConvention) -> Session {
    let mut config = StructurerConfig::default();
    config.backend.convention = convention;
    Session::new(config)
}

fn positions(haystack: &str, needles: &[&str]) -> Vec<usize> {
    needles
        .iter()
        .map(|needle| haystack.find(needle).unwrap_or_else(|| panic!("missing {:?}", needle)))
        .collect()
}

#[tokio::test]
async fn test_quarterly_revenue_scenario() {
    let mut session = session_with(CallConvention::SchemaConstrained);
    session.set_pasted_text("Q1 revenue rose 10%. Q2 revenue rose 12%.");
    let backend = ScriptedBackend::new().with_reply(QUARTERLY_PAYLOAD);

    let document = session
        .process(&backend, Some("summarize by quarter"))
        .await
        .unwrap()
        .as_str()
        .to_string();

    let found = positions(
        &document,
        &[
            "# Quarterly Revenue",
            "**Summary:** Revenue grew each quarter.",
            "- **Q1 growth:** 10%",
            "- **Q2 growth:** 12%",
            "## Q1\n\nRose 10%.",
            "## Q2\n\nRose 12%.",
        ],
    );
    assert!(found.windows(2).all(|w| w[0] < w[1]), "out of order: {:?}", found);

    let request = &backend.requests()[0];
    assert!(request.prompt.contains("summarize by quarter"));
    assert!(request.prompt.contains("Q1 revenue rose 10%."));
    assert!(request.response_schema.is_some());
}

#[tokio::test]
async fn test_embedded_convention_gives_same_document() {
    let mut constrained = session_with(CallConvention::SchemaConstrained);
    let mut embedded = session_with(CallConvention::EmbeddedPayload);
    for session in [&mut constrained, &mut embedded] {
        session.set_pasted_text("Q1 revenue rose 10%. Q2 revenue rose 12%.");
    }

    let plain = ScriptedBackend::new().with_reply(QUARTERLY_PAYLOAD);
    let fenced = ScriptedBackend::new()
        .with_reply(format!("Here is the analysis.\n\n```json\n{}\n```\n", QUARTERLY_PAYLOAD));

    let a = constrained.process(&plain, None).await.unwrap().clone();
    let b = embedded.process(&fenced, None).await.unwrap().clone();
    assert_eq!(a, b);

    let prompt = &fenced.requests()[0].prompt;
    assert!(prompt.contains("```json"));
    assert!(fenced.requests()[0].response_schema.is_none());
}

#[tokio::test]
async fn test_render_round_trip_keeps_every_pair() {
    let extractor = StructuredExtractor::new(CallConvention::SchemaConstrained, Duration::from_secs(5));
    let result = extractor.interpret(QUARTERLY_PAYLOAD).unwrap();
    let document = DocumentRenderer::new().render(&result);
    let text = document.as_str();

    assert!(text.contains(&format!("# {}", result.title)));
    assert!(text.contains(&result.summary));
    for section in &result.sections {
        assert!(text.contains(&format!("## {}\n\n{}", section.heading, section.content)));
    }
    for point in &result.key_data_points {
        assert!(text.contains(&format!("- **{}:** {}", point.label, point.value)));
    }
}

#[tokio::test]
async fn test_missing_field_leaves_document_unchanged() {
    let mut session = session_with(CallConvention::SchemaConstrained);
    session.set_pasted_text("anything");
    let raw = r#"{"title":"T","sections":[],"key_data_points":[]}"#;
    let backend = ScriptedBackend::new().with_reply(raw);

    let err = session.process(&backend, None).await.unwrap_err();
    assert!(matches!(err, StructurerError::SchemaValidation { ref field, .. } if field == "summary"));
    assert_eq!(err.raw_response(), Some(raw));
    assert_eq!(session.document().as_str(), INITIAL_DOCUMENT);
    assert!(session.revisions().is_empty());
}

#[tokio::test]
async fn test_missing_delimiter_is_format_error() {
    let mut session = session_with(CallConvention::EmbeddedPayload);
    session.set_pasted_text("anything");
    let backend = ScriptedBackend::new().with_reply(QUARTERLY_PAYLOAD);

    let err = session.process(&backend, None).await.unwrap_err();
    assert!(matches!(err, StructurerError::ExtractionFormat { .. }));
    assert_eq!(session.document().as_str(), INITIAL_DOCUMENT);
}

#[tokio::test]
async fn test_backend_timeout_is_backend_error() {
    let mut config = StructurerConfig::default();
    config.backend.timeout_seconds = 1;
    let mut session = Session::new(config);
    session.set_pasted_text("anything");
    let backend = ScriptedBackend::new()
        .with_reply(QUARTERLY_PAYLOAD)
        .with_delay(Duration::from_secs(3));

    let err = session.process(&backend, None).await.unwrap_err();
    assert!(matches!(err, StructurerError::Backend { kind: BackendFailureKind::Timeout, .. }));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_edit_loop_success_then_failure() {
    let mut session = session_with(CallConvention::SchemaConstrained);
    session.set_pasted_text("Q1 revenue rose 10%. Q2 revenue rose 12%.");
    let backend = ScriptedBackend::new().with_reply(QUARTERLY_PAYLOAD);
    session.process(&backend, None).await.unwrap();

    backend.push_reply("# Revenue\n\nOnly the totals.\n");
    session.submit_edit(&backend, "keep only totals").await.unwrap();
    assert_eq!(session.document().as_str(), "# Revenue\n\nOnly the totals.\n");
    assert!(session.history().is_empty());

    let before = session.document().as_str().as_bytes().to_vec();
    backend.push_failure(BackendFailureKind::Network, "connection reset");
    let err = session.submit_edit(&backend, "translate to French").await.unwrap_err();
    assert!(matches!(err, StructurerError::Backend { kind: BackendFailureKind::Network, .. }));
    assert_eq!(session.document().as_str().as_bytes(), before.as_slice());
    assert!(session.history().is_empty());
    assert_eq!(session.edit_state(), EditState::Idle);

    let origins: Vec<RevisionOrigin> = session.revisions().iter().map(|r| r.origin).collect();
    assert_eq!(origins, vec![RevisionOrigin::Structured, RevisionOrigin::AiEdit]);
}

#[tokio::test]
async fn test_blank_instruction_never_reaches_backend() {
    let mut session = session_with(CallConvention::SchemaConstrained);
    let backend = ScriptedBackend::new();
    let err = session.submit_edit(&backend, "   ").await.unwrap_err();
    assert!(matches!(err, StructurerError::EmptyInstruction));
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn test_text_and_workbook_are_both_sent() {
    let mut session = session_with(CallConvention::SchemaConstrained);
    session.set_pasted_text("Budget review notes.");
    session.load_workbook(&budget_workbook(), "budget.xlsx").unwrap();
    let backend = ScriptedBackend::new().with_reply(QUARTERLY_PAYLOAD);
    session.process(&backend, None).await.unwrap();

    let prompt = &backend.requests()[0].prompt;
    let found = positions(prompt, &["Budget review notes.", "## Sheet: Budget", "## Sheet: Notes"]);
    assert!(found.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(prompt.matches("| Fixed Costs").count(), 2);
}
