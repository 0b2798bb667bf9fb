//! Integration tests for menu-ingest.
//!
//! Everything runs against in-process collaborators: a stub text extractor
//! in place of pdfium, a scripted extraction service in place of the LLM and
//! an in-memory or temp-file SQLite store. The pdfium test at the bottom is
//! gated behind `E2E_ENABLED` and a menu PDF on disk.

use async_trait::async_trait;
use menu_ingest::{
    CanonicalField, DocumentTextExtractor, ExtractedText, ExtractionService, InMemoryMenuStore,
    IngestConfig, IngestError, ItemFilter, MenuIngestor, MenuStore, OperatorMapping, ServiceError,
    SqliteMenuStore, UploadedFile,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Returns a fixed text, as if read from a PDF.
struct StubText {
    text: String,
    pages: usize,
}

#[async_trait]
impl DocumentTextExtractor for StubText {
    async fn extract_text(&self, _bytes: &[u8]) -> Result<ExtractedText, IngestError> {
        Ok(ExtractedText {
            text: self.text.clone(),
            page_count: self.pages,
        })
    }
}

/// Answers every prompt with the same response and counts calls.
struct Scripted {
    response: Result<String, ServiceError>,
    calls: AtomicUsize,
}

impl Scripted {
    fn ok(body: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(body.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Err(ServiceError(message.to_string())),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionService for Scripted {
    async fn complete(&self, _prompt: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

fn csv(text: &str) -> UploadedFile {
    UploadedFile::new(text.as_bytes().to_vec(), "menu.csv", "text/csv")
}

fn pdf() -> UploadedFile {
    UploadedFile::new(b"%PDF-1.7 stub".to_vec(), "menu.pdf", "application/pdf")
}

/// Route library logs to the test harness; `RUST_LOG=debug` shows stages.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn csv_ingestor(store: Arc<dyn MenuStore>) -> MenuIngestor {
    init_logging();
    MenuIngestor::new(IngestConfig::default(), store)
}

fn pdf_ingestor(store: Arc<dyn MenuStore>, service: Arc<Scripted>, text: &str) -> MenuIngestor {
    init_logging();
    MenuIngestor::new(IngestConfig::default(), store)
        .with_text_extractor(Arc::new(StubText {
            text: text.to_string(),
            pages: 2,
        }))
        .with_extraction_service(service)
}

const MENU_TEXT: &str = "BEVERAGES\nTea ... 120\nCoffee ... 250\nMAINS\nChicken Kottu ... 850";

const MENU_JSON: &str = r#"```json
[
  {"category": "Beverages", "name": "Tea", "description": "", "price": 120, "currency": "lkr"},
  {"category": "Beverages", "name": "Coffee", "description": "Filter", "price": "250"},
  {"category": "Mains", "name": "Chicken Kottu", "description": "", "price": 850, "currency": "LKR"}
]
```"#;

// ── Tabular path ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn vendor_headers_map_by_synonym() {
    let store = Arc::new(InMemoryMenuStore::new());
    let ingestor = csv_ingestor(store.clone());

    let report = ingestor
        .ingest_csv(
            &csv("Dish,Cost,Cat\nChicken Kottu,850,Mains\nTea,120,Beverages\n"),
            "vendor-1",
            &OperatorMapping::new(),
            false,
        )
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.message, "Menu upload completed");
    assert_eq!(report.summary.total_rows, 2);
    assert_eq!(report.summary.saved_rows, 2);
    assert_eq!(report.saved_ids.len(), 2);

    let mapping = &report.mapping.as_ref().unwrap().applied;
    assert_eq!(mapping.resolve("Dish"), Some(CanonicalField::Name));
    assert_eq!(mapping.resolve("Cost"), Some(CanonicalField::Price));
    assert_eq!(mapping.resolve("Cat"), Some(CanonicalField::Category));

    let stored = store.items();
    let kottu = stored.iter().find(|s| s.item.name() == "Chicken Kottu").unwrap();
    assert_eq!(kottu.item.price(), 850.0);
    assert_eq!(kottu.item.category(), "Mains");
    assert_eq!(kottu.item.currency(), "LKR");
    assert_eq!(kottu.item.owner_id(), "vendor-1");
    assert!(kottu.item.is_available());
}

#[tokio::test]
async fn missing_price_column_blocks_ingestion() {
    let store = Arc::new(InMemoryMenuStore::new());
    let ingestor = csv_ingestor(store.clone());
    let file = csv("Dish,Cat,Spicy Level\nKottu,Mains,3\n");

    let analysis = ingestor.analyze_csv(&file).await.unwrap();
    assert!(!analysis.ready_to_upload);
    assert_eq!(analysis.missing_required_fields, vec![CanonicalField::Price]);

    let err = ingestor
        .ingest_csv(&file, "vendor-1", &OperatorMapping::new(), false)
        .await
        .unwrap_err();
    match err {
        IngestError::MappingIncomplete {
            missing_required,
            unmapped_columns,
            ..
        } => {
            assert_eq!(missing_required, vec!["price".to_string()]);
            assert_eq!(unmapped_columns, vec!["Spicy Level".to_string()]);
        }
        other => panic!("expected MappingIncomplete, got {other:?}"),
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn invalid_rows_are_reported_not_fatal() {
    let store = Arc::new(InMemoryMenuStore::new());
    let ingestor = csv_ingestor(store.clone());

    let report = ingestor
        .ingest_csv(
            &csv("name,price,category\nTea,120,Beverages\n,100,Beverages\nCake,abc,Desserts\nRice,-5,Mains\n"),
            "vendor-1",
            &OperatorMapping::new(),
            false,
        )
        .await
        .unwrap();

    assert_eq!(report.summary.total_rows, 4);
    assert_eq!(report.summary.valid_rows, 1);
    assert_eq!(report.summary.skipped_rows, 3);
    assert_eq!(report.summary.saved_rows, 1);

    let messages: Vec<&str> = report.errors.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "Row 2: Name is required",
            "Row 3: Price must be a valid positive number",
            "Row 4: Price must be a valid positive number",
        ]
    );
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn preview_writes_nothing_and_matches_real_run() {
    let body = "Item,Price,Section,Available\nTea,120,Beverages,yes\nCoffee,250,Beverages,no\n";

    let preview_store = Arc::new(InMemoryMenuStore::new());
    let preview = csv_ingestor(preview_store.clone())
        .ingest_csv(&csv(body), "vendor-1", &OperatorMapping::new(), true)
        .await
        .unwrap();

    assert!(preview.preview);
    assert_eq!(preview.message, "CSV preview completed successfully");
    assert_eq!(preview.summary.saved_rows, 0);
    assert!(preview.saved_ids.is_empty());
    assert!(preview_store.is_empty());

    let items = preview.preview_data.as_ref().unwrap();
    assert_eq!(items.len(), 2);
    assert!(!items[1].is_available());

    let real_store = Arc::new(InMemoryMenuStore::new());
    let real = csv_ingestor(real_store.clone())
        .ingest_csv(&csv(body), "vendor-1", &OperatorMapping::new(), false)
        .await
        .unwrap();
    let saved: Vec<_> = real_store.items().into_iter().map(|s| s.item).collect();
    assert_eq!(&saved, items);
    assert_eq!(real.summary.valid_rows, preview.summary.valid_rows);
}

#[tokio::test]
async fn repeated_preview_is_identical_and_writes_nothing() {
    let body = "Item,Price,Section\nTea,120,Beverages\nBad,abc,Beverages\nKottu,900,Mains\n";
    let store = Arc::new(InMemoryMenuStore::new());
    let ingestor = csv_ingestor(store.clone());

    let first = ingestor
        .ingest_csv(&csv(body), "vendor-1", &OperatorMapping::new(), true)
        .await
        .unwrap();
    let second = ingestor
        .ingest_csv(&csv(body), "vendor-1", &OperatorMapping::new(), true)
        .await
        .unwrap();

    assert_eq!(first.preview_data, second.preview_data);
    assert_eq!(first.preview_data.as_ref().map(Vec::len), Some(2));
    assert_eq!(first.errors, second.errors);
    assert_eq!(first.summary, second.summary);
    assert!(store.is_empty());

    let service = Scripted::ok(MENU_JSON);
    let ingestor = pdf_ingestor(store.clone(), service.clone(), MENU_TEXT);
    let first = ingestor.ingest_pdf(&pdf(), "vendor-1", true).await.unwrap();
    let second = ingestor.ingest_pdf(&pdf(), "vendor-1", true).await.unwrap();
    assert_eq!(first.preview_data, second.preview_data);
    assert_eq!(service.calls(), 2);
    assert!(store.is_empty());
}

#[tokio::test]
async fn preview_data_is_capped() {
    let mut body = String::from("name,price,category\n");
    for i in 0..25 {
        body.push_str(&format!("Item {i},{i},Mains\n"));
    }
    let config = IngestConfig::builder().preview_limit(5).build().unwrap();
    let report = MenuIngestor::new(config, Arc::new(InMemoryMenuStore::new()))
        .ingest_csv(&csv(&body), "vendor-1", &OperatorMapping::new(), true)
        .await
        .unwrap();
    assert_eq!(report.summary.valid_rows, 25);
    assert_eq!(report.preview_data.unwrap().len(), 5);
}

#[tokio::test]
async fn operator_override_beats_auto_mapping() {
    let store = Arc::new(InMemoryMenuStore::new());
    let ingestor = csv_ingestor(store.clone());
    let mapping = OperatorMapping::parse(r#"{"Item Title": "name", "Type": "description"}"#).unwrap();

    let report = ingestor
        .ingest_csv(
            &csv("Item Title,Type,Cat,Price\nKottu,Spicy,Mains,900\n"),
            "vendor-1",
            &mapping,
            false,
        )
        .await
        .unwrap();

    let applied = &report.mapping.as_ref().unwrap().applied;
    assert_eq!(applied.resolve("Item Title"), Some(CanonicalField::Name));
    assert_eq!(applied.resolve("Type"), Some(CanonicalField::Description));
    assert_eq!(applied.resolve("Cat"), Some(CanonicalField::Category));

    let stored = store.items();
    assert_eq!(stored[0].item.name(), "Kottu");
    assert_eq!(stored[0].item.description(), "Spicy");
}

#[test]
fn unknown_override_target_is_rejected() {
    let err = OperatorMapping::parse(r#"{"Dish": "dish_name"}"#).unwrap_err();
    assert!(matches!(err, IngestError::InvalidMappingFormat { .. }));
}

#[tokio::test]
async fn persistence_failure_on_one_item_keeps_the_rest() {
    let store = Arc::new(InMemoryMenuStore::with_rejection(|index, _| {
        (index == 2).then(|| "duplicate item".to_string())
    }));
    let ingestor = csv_ingestor(store.clone());

    let report = ingestor
        .ingest_csv(
            &csv("name,price,category\nA,1,X\nB,2,X\nC,3,X\nD,4,X\nE,5,X\n"),
            "vendor-1",
            &OperatorMapping::new(),
            false,
        )
        .await
        .unwrap();

    assert!(report.success);
    assert!(report.is_partial());
    assert_eq!(report.summary.valid_rows, 5);
    assert_eq!(report.summary.saved_rows, 4);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].item_name, "C");
    assert_eq!(
        report.failures[0].describe(),
        "Database error on item 3 (C): duplicate item"
    );
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn store_outage_fails_the_request() {
    let ingestor = csv_ingestor(Arc::new(InMemoryMenuStore::unavailable("connection refused")));
    let err = ingestor
        .ingest_csv(
            &csv("name,price,category\nTea,1,Drinks\n"),
            "vendor-1",
            &OperatorMapping::new(),
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::PersistenceFailure { .. }));
    assert!(!err.is_rejection());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let config = IngestConfig::builder().max_file_size(16).build().unwrap();
    let ingestor = MenuIngestor::new(config, Arc::new(InMemoryMenuStore::new()));
    let err = ingestor
        .ingest(
            &csv("name,price,category\nTea,1,Drinks\n"),
            "vendor-1",
            &OperatorMapping::new(),
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::FileTooLarge { limit: 16, .. }));
}

// ── Document path ────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_preview_then_save_reviewed() {
    let store = Arc::new(InMemoryMenuStore::new());
    let service = Scripted::ok(MENU_JSON);
    let ingestor = pdf_ingestor(store.clone(), service.clone(), MENU_TEXT);

    let preview = ingestor.ingest_pdf(&pdf(), "vendor-1", true).await.unwrap();
    assert_eq!(
        preview.message,
        "PDF menu extracted successfully. Review the items below."
    );
    assert_eq!(preview.filename.as_deref(), Some("menu.pdf"));
    assert_eq!(preview.pages, Some(2));
    assert_eq!(preview.summary.total_rows, 3);
    assert!(store.is_empty());
    assert_eq!(service.calls(), 1);

    let items = preview.preview_data.unwrap();
    assert_eq!(items[0].currency(), "LKR");
    assert_eq!(items[1].price(), 250.0);

    // The operator re-submits what they reviewed, unchanged.
    let reviewed: Vec<serde_json::Value> = items
        .iter()
        .map(|item| serde_json::to_value(item).unwrap())
        .collect();
    let saved = ingestor
        .save_reviewed_items(&reviewed, "vendor-1")
        .await
        .unwrap();
    assert_eq!(saved.message, "Successfully saved 3 menu items");
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn extracted_items_take_the_configured_currency() {
    init_logging();
    let config = IngestConfig::builder().default_currency("usd").build().unwrap();
    let ingestor = MenuIngestor::new(config, Arc::new(InMemoryMenuStore::new()))
        .with_text_extractor(Arc::new(StubText {
            text: MENU_TEXT.to_string(),
            pages: 1,
        }))
        .with_extraction_service(Scripted::ok(MENU_JSON));

    let report = ingestor.ingest_pdf(&pdf(), "vendor-1", true).await.unwrap();
    let items = report.preview_data.unwrap();
    assert_eq!(items[0].currency(), "LKR");
    assert_eq!(items[1].currency(), "USD");
}

#[tokio::test]
async fn pdf_direct_save_reports_partial() {
    let store = Arc::new(InMemoryMenuStore::with_rejection(|_, item| {
        (item.name() == "Coffee").then(|| "constraint violated".to_string())
    }));
    let ingestor = pdf_ingestor(store.clone(), Scripted::ok(MENU_JSON), MENU_TEXT);

    let report = ingestor.ingest_pdf(&pdf(), "vendor-1", false).await.unwrap();
    assert_eq!(report.message, "Partially saved: 2 of 3 items");
    assert_eq!(report.summary.saved_rows, 2);
    assert_eq!(report.failures[0].item_name, "Coffee");
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn empty_extraction_is_no_items() {
    let store = Arc::new(InMemoryMenuStore::new());
    let ingestor = pdf_ingestor(store.clone(), Scripted::ok("[]"), MENU_TEXT);
    let err = ingestor.ingest_pdf(&pdf(), "vendor-1", false).await.unwrap_err();
    assert!(matches!(err, IngestError::NoItemsExtracted { pages: 2 }));
    assert_eq!(err.to_json()["totalItems"], 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn malformed_response_is_schema_violation() {
    let store = Arc::new(InMemoryMenuStore::new());
    for body in [
        "Here are the items you asked for",
        r#"{"items": []}"#,
        r#"[{"name": "Tea", "price": 100}]"#,
    ] {
        let ingestor = pdf_ingestor(store.clone(), Scripted::ok(body), MENU_TEXT);
        let err = ingestor.ingest_pdf(&pdf(), "vendor-1", true).await.unwrap_err();
        assert!(
            matches!(err, IngestError::ExtractionSchemaViolation { .. }),
            "{body} gave {err:?}"
        );
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn service_failure_is_not_a_rejection() {
    let ingestor = pdf_ingestor(
        Arc::new(InMemoryMenuStore::new()),
        Scripted::failing("503 Service Unavailable"),
        MENU_TEXT,
    );
    let err = ingestor.ingest_pdf(&pdf(), "vendor-1", false).await.unwrap_err();
    assert!(matches!(err, IngestError::ExtractionServiceFailure { .. }));
    assert!(!err.is_rejection());
}

#[tokio::test]
async fn blank_document_never_reaches_the_service() {
    let service = Scripted::ok(MENU_JSON);
    let ingestor = pdf_ingestor(Arc::new(InMemoryMenuStore::new()), service.clone(), "  \n ");
    let err = ingestor.ingest_pdf(&pdf(), "vendor-1", false).await.unwrap_err();
    assert!(matches!(err, IngestError::EmptyOrImageOnlyDocument));
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn zero_priced_items_survive_but_all_invalid_is_an_error() {
    // Coerced price 0 is valid; the name check already happened upstream.
    let body = r#"[{"category": "Extras", "name": "Water", "price": "free"}]"#;
    let store = Arc::new(InMemoryMenuStore::new());
    let report = pdf_ingestor(store.clone(), Scripted::ok(body), MENU_TEXT)
        .ingest_pdf(&pdf(), "vendor-1", false)
        .await
        .unwrap();
    assert_eq!(report.summary.saved_rows, 1);
    assert_eq!(store.items()[0].item.price(), 0.0);

    let err = csv_ingestor(Arc::new(InMemoryMenuStore::new()))
        .save_reviewed_items(&[serde_json::json!({"category": "X", "name": "Y", "price": -1})], "v")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::NoValidItems { .. }));
}

// ── SQLite ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sqlite_round_trip_and_listing() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("menu.db");

    {
        let store = Arc::new(SqliteMenuStore::open(&db).unwrap());
        let report = csv_ingestor(store)
            .ingest_csv(
                &csv("name,price,category,in stock\nTea,120,Beverages,yes\nKottu,900,Mains,1\nCoffee,250,Beverages,no\n"),
                "vendor-1",
                &OperatorMapping::new(),
                false,
            )
            .await
            .unwrap();
        assert_eq!(report.summary.saved_rows, 3);
    }

    let ingestor = csv_ingestor(Arc::new(SqliteMenuStore::open(&db).unwrap()));

    let all = ingestor
        .list_items("vendor-1", &ItemFilter::default())
        .await
        .unwrap();
    let names: Vec<&str> = all.iter().map(|s| s.item.name()).collect();
    assert_eq!(names, vec!["Coffee", "Tea", "Kottu"]);

    let available_drinks = ingestor
        .list_items(
            "vendor-1",
            &ItemFilter {
                category: Some("Beverages".into()),
                is_available: Some(true),
            },
        )
        .await
        .unwrap();
    assert_eq!(available_drinks.len(), 1);
    assert_eq!(available_drinks[0].item.name(), "Tea");

    assert!(ingestor
        .list_items("someone-else", &ItemFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn sqlite_items_can_be_edited_and_removed_by_their_owner() {
    let dir = tempfile::tempdir().unwrap();
    let ingestor = csv_ingestor(Arc::new(SqliteMenuStore::open(dir.path().join("menu.db")).unwrap()));
    let report = ingestor
        .ingest_csv(
            &csv("name,price,category\nTea,120,Beverages\nKottu,900,Mains\n"),
            "vendor-1",
            &OperatorMapping::new(),
            false,
        )
        .await
        .unwrap();
    let tea = report.saved_ids[0].clone();
    let kottu = report.saved_ids[1].clone();

    let err = ingestor
        .update_item("vendor-2", &tea, &serde_json::json!({"price": 1}))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::ItemNotFound { .. }));
    assert!(err.is_rejection());

    let err = ingestor
        .update_item("vendor-1", &tea, &serde_json::json!({"category": ""}))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::InvalidItem { .. }));

    let updated = ingestor
        .update_item("vendor-1", &tea, &serde_json::json!({"name": "Ginger Tea", "price": 140}))
        .await
        .unwrap();
    assert_eq!(updated.id, tea);
    assert_eq!(updated.item.name(), "Ginger Tea");
    assert_eq!(updated.item.category(), "Beverages");

    assert!(matches!(
        ingestor.delete_item("vendor-2", &kottu).await,
        Err(IngestError::ItemNotFound { .. })
    ));
    ingestor.delete_item("vendor-1", &kottu).await.unwrap();

    let remaining = ingestor
        .list_items("vendor-1", &ItemFilter::default())
        .await
        .unwrap();
    let names: Vec<&str> = remaining.iter().map(|s| s.item.name()).collect();
    assert_eq!(names, vec!["Ginger Tea"]);
    assert_eq!(remaining[0].item.price(), 140.0);
}

#[test]
fn blocking_callers_can_drive_the_ingestor() {
    let ingestor = csv_ingestor(Arc::new(InMemoryMenuStore::new()));
    let analysis = tokio_test::block_on(
        ingestor.analyze_csv(&csv("Product Name,Unit Price,Menu Category\nTea,1,Drinks\n")),
    )
    .unwrap();
    assert!(analysis.ready_to_upload);
    assert_eq!(analysis.total_rows, 1);
}

// ── Live pdfium ──────────────────────────────────────────────────────────────

/// Skip unless E2E_ENABLED is set and a menu PDF exists at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

#[tokio::test]
async fn e2e_pdfium_reads_menu_text() {
    let path = e2e_skip_unless_ready!(
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/menu.pdf")
    );
    let bytes = std::fs::read(&path).unwrap();
    let text = menu_ingest::PdfiumTextExtractor::new()
        .extract_text(&bytes)
        .await
        .unwrap();
    assert!(text.page_count >= 1);
    assert!(!text.is_blank());
}
