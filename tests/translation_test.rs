use feed_gateway::{
    batch::BatchTranslator,
    quality::*,
    retry::{ErrorClass, RetryPolicy},
    translator::MockTranslateBackend,
    types::*,
    TranslateConfig,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio;
use tracing::info;
use tracing_subscriber;

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay_ms: 1,
        multiplier: 2.0,
        rate_limit_delay_ms: 2,
    }
}

fn fast_config() -> TranslateConfig {
    TranslateConfig {
        group_size: 3,
        group_delay_ms: 0,
        retry: fast_policy(),
    }
}

#[tokio::test]
async fn test_batch_preserves_length_and_order() -> Result<()> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    info!("Testing batch length and order");

    let backend = Arc::new(MockTranslateBackend::new());
    let translator = BatchTranslator::new(backend.clone(), fast_config());

    let texts: Vec<String> = vec![
        "Première dépêche".to_string(),
        "Deuxième dépêche".to_string(),
        "Troisième dépêche".to_string(),
        "Quatrième dépêche".to_string(),
        "Cinquième dépêche".to_string(),
    ];
    let translated = translator.translate_batch(&texts, "fr", "en").await;

    assert_eq!(translated.len(), texts.len(), "Output must match input length");
    for (input, output) in texts.iter().zip(&translated) {
        assert_eq!(
            output,
            &format!("[en] {}", input),
            "Outputs must line up with inputs"
        );
    }
    assert_eq!(backend.calls(), 5);

    info!("Batch length and order test completed successfully!");
    Ok(())
}

#[tokio::test]
async fn test_blank_inputs_bypass_backend() -> Result<()> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    info!("Testing blank input handling");

    let backend = Arc::new(MockTranslateBackend::new());
    let translator = BatchTranslator::new(backend.clone(), fast_config());

    let texts = vec![
        "".to_string(),
        "   ".to_string(),
        "Bonjour tout le monde".to_string(),
    ];
    let translated = translator.translate_batch(&texts, "fr", "en").await;

    assert_eq!(translated[0], "", "Empty input passes through untouched");
    assert_eq!(translated[1], "   ", "Whitespace input passes through untouched");
    assert_eq!(translated[2], "[en] Bonjour tout le monde");
    assert_eq!(backend.calls(), 1, "Blank inputs must never reach the backend");

    let nothing = translator.translate_batch(&[], "fr", "en").await;
    assert!(nothing.is_empty());
    assert_eq!(backend.calls(), 1);

    info!("Blank input test completed successfully!");
    Ok(())
}

#[tokio::test]
async fn test_transient_failure_retries_then_succeeds() -> Result<()> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    info!("Testing retry on transient failure");

    let backend = Arc::new(MockTranslateBackend::new().fail_times(1));
    let translator = BatchTranslator::new(backend.clone(), fast_config());

    let texts = vec!["Une seule dépêche".to_string()];
    let translated = translator.translate_batch(&texts, "fr", "en").await;

    assert_eq!(translated[0], "[en] Une seule dépêche");
    assert_eq!(backend.calls(), 2, "One failure plus one successful retry");

    info!("Retry test completed successfully!");
    Ok(())
}

#[tokio::test]
async fn test_rate_limited_request_retries_on_longer_schedule() -> Result<()> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    info!("Testing rate limit retry");

    let backend = Arc::new(MockTranslateBackend::new().rate_limit_times(1));
    let translator = BatchTranslator::new(backend.clone(), fast_config());

    let texts = vec!["Flash spécial de la rédaction".to_string()];
    let translated = translator.translate_batch(&texts, "fr", "en").await;

    assert_eq!(translated[0], "[en] Flash spécial de la rédaction");
    assert_eq!(backend.calls(), 2);

    info!("Rate limit retry test completed successfully!");
    Ok(())
}

#[tokio::test]
async fn test_upstream_retry_hint_stretches_the_backoff() -> Result<()> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    info!("Testing upstream retry hint");

    // The configured rate-limit delay is 2ms; only the 200ms hint can
    // push the retry past the threshold asserted below.
    let backend = Arc::new(
        MockTranslateBackend::new()
            .rate_limit_times(1)
            .with_retry_after(200),
    );
    let translator = BatchTranslator::new(backend.clone(), fast_config());

    let texts = vec!["Bulletin météo de la mi-journée".to_string()];
    let started = Instant::now();
    let translated = translator.translate_batch(&texts, "fr", "en").await;
    let elapsed = started.elapsed();

    assert_eq!(translated[0], "[en] Bulletin météo de la mi-journée");
    assert_eq!(backend.calls(), 2);
    assert!(
        elapsed >= Duration::from_millis(95),
        "The upstream hint must drive the retry delay, elapsed {:?}",
        elapsed
    );
    assert!(
        elapsed < Duration::from_secs(2),
        "The hint must not balloon the wait, elapsed {:?}",
        elapsed
    );

    info!("Upstream retry hint test completed successfully!");
    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_fall_back_with_marker() -> Result<()> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    info!("Testing fallback after exhausted retries");

    let backend = Arc::new(MockTranslateBackend::new().fail_times(1_000));
    let translator = BatchTranslator::new(backend.clone(), fast_config());

    let texts = vec!["Chronique du matin".to_string()];
    let translated = translator.translate_batch(&texts, "fr", "en").await;

    assert_eq!(translated.len(), 1);
    assert!(
        has_marker(&translated[0]),
        "Failed translation must fall back to the tagged original"
    );
    assert!(translated[0].contains("Chronique du matin"));
    assert_eq!(backend.calls(), 3, "Initial attempt plus two retries");

    info!("Fallback test completed successfully!");
    Ok(())
}

#[tokio::test]
async fn test_all_failures_still_length_preserving() -> Result<()> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    info!("Testing length preservation when everything fails");

    let backend = Arc::new(MockTranslateBackend::new().fail_times(1_000));
    let config = TranslateConfig {
        retry: RetryPolicy {
            max_attempts: 1,
            base_delay_ms: 1,
            ..RetryPolicy::default()
        },
        ..fast_config()
    };
    let translator = BatchTranslator::new(backend.clone(), config);

    let texts: Vec<String> = (1..=4).map(|n| format!("Dépêche numéro {}", n)).collect();
    let translated = translator.translate_batch(&texts, "fr", "en").await;

    assert_eq!(translated.len(), 4, "Every input keeps its slot");
    for (input, output) in texts.iter().zip(&translated) {
        assert!(has_marker(output), "Each failed item carries the marker");
        assert!(output.contains(input), "Each fallback keeps its own original text");
    }
    assert_eq!(backend.calls(), 8, "Four items, two attempts each");

    info!("Length preservation test completed successfully!");
    Ok(())
}

#[tokio::test]
async fn test_identical_output_is_tagged_not_retried() -> Result<()> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    info!("Testing identical output handling");

    let backend = Arc::new(
        MockTranslateBackend::new().respond_with("Communiqué officiel", "Communiqué officiel"),
    );
    let translator = BatchTranslator::new(backend.clone(), fast_config());

    let texts = vec!["Communiqué officiel".to_string()];
    let translated = translator.translate_batch(&texts, "fr", "en").await;

    assert_eq!(
        translated[0],
        format!("{} Communiqué officiel", UNTRANSLATED_MARKER),
        "Echoed output is kept but tagged"
    );
    assert_eq!(backend.calls(), 1, "An echo is accepted, not retried");

    info!("Identical output test completed successfully!");
    Ok(())
}

#[tokio::test]
async fn test_already_marked_echo_is_not_tagged_again() -> Result<()> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    info!("Testing marked echo handling");

    let marked = format!("{} Procès-verbal du conseil municipal", UNTRANSLATED_MARKER);
    let backend =
        Arc::new(MockTranslateBackend::new().respond_with(marked.clone(), marked.clone()));
    let translator = BatchTranslator::new(backend.clone(), fast_config());

    let translated = translator.translate_batch(&[marked.clone()], "fr", "en").await;

    assert_eq!(
        translated[0], marked,
        "Text already carrying the marker keeps a single tag"
    );
    assert_eq!(backend.calls(), 1);

    info!("Marked echo test completed successfully!");
    Ok(())
}

#[tokio::test]
async fn test_rejected_output_falls_back_without_retry() -> Result<()> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    info!("Testing quality rejection");

    let backend = Arc::new(
        MockTranslateBackend::new().respond_with("Les négociations ont repris à Bruxelles", "the"),
    );
    let translator = BatchTranslator::new(backend.clone(), fast_config());

    let texts = vec!["Les négociations ont repris à Bruxelles".to_string()];
    let translated = translator.translate_batch(&texts, "fr", "en").await;

    assert!(has_marker(&translated[0]), "Rejected output falls back to the original");
    assert!(translated[0].contains("Les négociations ont repris à Bruxelles"));
    assert_eq!(
        backend.calls(),
        1,
        "A quality rejection is not retried; the engine would answer the same"
    );

    info!("Quality rejection test completed successfully!");
    Ok(())
}

#[tokio::test]
async fn test_anchor_terms_are_enforced() -> Result<()> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    info!("Testing anchor term enforcement");

    let backend = Arc::new(
        MockTranslateBackend::new()
            .respond_with("La situation en Ukraine évolue rapidement", "The situation evolves quickly")
            .respond_with("Le chantier du pont reprend lundi", "Ukraine bridge works resume Monday"),
    );
    let guard = HeuristicQualityGuard::new().anchor("fr", "en", "Ukraine", "Ukraine");
    let translator =
        BatchTranslator::new(backend.clone(), fast_config()).with_guard(Arc::new(guard));

    let texts = vec![
        "La situation en Ukraine évolue rapidement".to_string(),
        "Les marchés terminent la séance en hausse".to_string(),
        "Le chantier du pont reprend lundi".to_string(),
    ];
    let translated = translator.translate_batch(&texts, "fr", "en").await;

    assert!(
        has_marker(&translated[0]),
        "Output dropping an anchor term must be rejected"
    );
    assert_eq!(
        translated[1], "[en] Les marchés terminent la séance en hausse",
        "Texts without the anchor term are unaffected"
    );
    assert!(
        has_marker(&translated[2]),
        "Output introducing an anchor term absent from the source must be rejected"
    );

    info!("Anchor term test completed successfully!");
    Ok(())
}

#[tokio::test]
async fn test_groups_run_sequentially_with_delay() -> Result<()> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    info!("Testing group pacing");

    let backend = Arc::new(MockTranslateBackend::new());
    let config = TranslateConfig {
        group_size: 3,
        group_delay_ms: 40,
        retry: fast_policy(),
    };
    let translator = BatchTranslator::new(backend.clone(), config);

    let texts: Vec<String> = (1..=7).map(|n| format!("Article {}", n)).collect();
    let started = Instant::now();
    let translated = translator.translate_batch(&texts, "fr", "en").await;
    let elapsed = started.elapsed();

    assert_eq!(translated.len(), 7);
    // Three groups means two pauses between them.
    assert!(
        elapsed >= Duration::from_millis(80),
        "Two inter-group delays expected, elapsed {:?}",
        elapsed
    );
    assert!(
        elapsed < Duration::from_secs(2),
        "Pacing should not balloon, elapsed {:?}",
        elapsed
    );

    info!("Group pacing test completed successfully!");
    Ok(())
}

#[test]
fn test_quality_guard_shapes() {
    let guard = HeuristicQualityGuard::new();

    // Empty output against a real source
    assert_eq!(
        guard.assess("Texte original", "", "fr", "en"),
        Verdict::Reject(RejectReason::Truncated)
    );

    // Output collapsed to a fraction of the source
    assert_eq!(
        guard.assess(
            "Une très longue phrase qui continue encore et encore",
            "Bref",
            "fr",
            "en"
        ),
        Verdict::Reject(RejectReason::Truncated)
    );

    // A short source may legitimately translate to one word
    assert_eq!(guard.assess("Bonjour", "Hello", "fr", "en"), Verdict::Accept);

    // Article plus word where the source was a phrase
    assert_eq!(
        guard.assess("Résultats du championnat", "The results", "fr", "en"),
        Verdict::Reject(RejectReason::Degenerate)
    );

    // Bare token where the source was a phrase
    assert_eq!(
        guard.assess("Nouvelles du jour", "Bulletins", "fr", "en"),
        Verdict::Reject(RejectReason::Degenerate)
    );

    // Unchanged output is accepted but flagged for tagging
    assert_eq!(
        guard.assess("Update", "Update", "fr", "en"),
        Verdict::AcceptUntranslated
    );

    // A reasonable translation passes
    assert_eq!(
        guard.assess(
            "Le chat dort sur le canapé",
            "The cat sleeps on the couch",
            "fr",
            "en"
        ),
        Verdict::Accept
    );
}

#[test]
fn test_marker_tag_never_stacks() {
    let tagged = tag_untranslated("Dernière minute");
    assert!(has_marker(&tagged));
    assert_eq!(tagged, format!("{} Dernière minute", UNTRANSLATED_MARKER));
    assert_eq!(tag_untranslated(&tagged), tagged);
}

#[test]
fn test_rate_limit_hint_overrides_configured_delay() {
    let policy = RetryPolicy::default();

    let hinted = policy.backoff_for(ErrorClass::RateLimited, Some(Duration::from_secs(7)));
    assert_eq!(hinted.initial_interval, Duration::from_secs(7));
    assert_eq!(hinted.max_interval, Duration::from_secs(56));

    let unhinted = policy.backoff_for(ErrorClass::RateLimited, None);
    assert_eq!(unhinted.initial_interval, Duration::from_millis(5_000));

    let transient = policy.backoff_for(ErrorClass::Transient, Some(Duration::from_secs(7)));
    assert_eq!(
        transient.initial_interval,
        Duration::from_millis(400),
        "A wait hint only applies to rate-limited requests"
    );
}
