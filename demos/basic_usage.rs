use suzumina_errors::logging::{init_logging, LoggingConfig};
use suzumina_errors::{
    ErrorClassifier, ErrorContext, ErrorHandler, HandlerSettings, RuleClassifier, SourceError,
};

#[tokio::main]
async fn main() {
    let settings = HandlerSettings::from_env().unwrap_or_default();
    if let Err(err) = init_logging(LoggingConfig::for_environment(settings.environment)) {
        eprintln!("logging disabled: {err}");
    }

    println!("suzumina-errors - Basic Usage Examples");

    classification_example();
    handling_example(ErrorHandler::new(settings)).await;
}

fn classification_example() {
    println!("\n=== Classification ===");

    let classifier = RuleClassifier::default();
    let errors = vec![
        SourceError::new("YouTube Data API quota exceeded"),
        SourceError::new("DLsite page structure changed"),
        SourceError::new("Firestore batch commit failed"),
        SourceError::new("Network timeout occurred"),
        SourceError::new("Missing environment variable GCP_PROJECT"),
        SourceError::new("something odd happened"),
    ];

    for error in errors {
        let kind = classifier.classify(&error);
        println!(
            "{:<45} | {:<26} | {:<8} | {}",
            error.message,
            kind,
            kind.severity(),
            kind.strategy()
        );
    }
}

async fn handling_example(handler: ErrorHandler) {
    println!("\n=== Handling ===");

    let cases = [
        ("fetchDLsiteWorks", "parse-page", "DLsite selector .work_name not found"),
        ("fetchDLsiteWorks", "save", "Firestore batch commit failed"),
        ("fetchYouTubeVideos", "search", "YouTube API quota exceeded"),
        ("fetchYouTubeVideos", "search", "YouTube API returned 500"),
        ("test", "network-request", "Network timeout occurred"),
    ];

    for (function, operation, message) in cases {
        let result = handler
            .handle_error(message, ErrorContext::new(function, operation))
            .await;
        println!(
            "{function}.{operation}: {} (continue: {}, recovered: {})",
            result.category, result.can_continue, result.recovery_successful
        );
    }

    println!("\n=== Statistics ===");
    match serde_json::to_string_pretty(&handler.statistics()) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("statistics unavailable: {err}"),
    }
}
