use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use backend::app::{self, AppState};
use backend::auth::{USER_ID_HEADER, USER_ROLE_HEADER};
use backend::config::AppConfig;
use backend::job_controller::state::{start_job_updater, JobsState};
use backend::persistence::SqlitePropertyStore;
use common::jobs::{IngestionProgress, IngestionStatus};
use common::requests::{ApiResponse, UploadAccepted};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const BOUNDARY: &str = "----listing-ingest-test-boundary";
const HEADER: &str = "title,property_type,listing_type,price,address,city,state,bedrooms,bathrooms,area\n";

struct Harness {
    state: AppState,
    store: Arc<SqlitePropertyStore>,
    _dir: TempDir,
}

fn harness_with(config: AppConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqlitePropertyStore::open(dir.path().join("listings.sqlite")).unwrap());
    let (jobs, rx) = JobsState::new(config.ingest.update_channel_capacity);
    tokio::spawn(start_job_updater(jobs.clone(), rx));
    let state = AppState::new(&config, jobs, store.clone());
    Harness {
        state,
        store,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(AppConfig::default())
}

fn csv_rows(count: usize, missing_price_at: Option<usize>) -> Vec<u8> {
    let mut body = HEADER.to_string();
    for n in 1..=count {
        let price = if Some(n) == missing_price_at { "" } else { "315000" };
        body.push_str(&format!(
            "Listing {n},condo,sale,{price},{n} Birch Ave,Tulsa,OK,2,1.5,1100\n"
        ));
    }
    body.into_bytes()
}

fn multipart_body(field: &str, file_name: &str, content_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(body: Vec<u8>, role: Option<&str>) -> test::TestRequest {
    let mut req = test::TestRequest::post()
        .uri("/uploads/bulk/properties")
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body);
    if let Some(role) = role {
        req = req
            .insert_header((USER_ID_HEADER, "agent-7"))
            .insert_header((USER_ROLE_HEADER, role));
    }
    req
}

macro_rules! app {
    ($h:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($h.state.clone()))
                .configure(app::configure),
        )
        .await
    };
}

/// Uploads `content` as an agent and returns the accepted upload id.
macro_rules! upload {
    ($app:expr, $file_name:expr, $content:expr) => {{
        let body = multipart_body("file", $file_name, "text/csv", $content);
        let resp = test::call_service(&$app, upload_request(body, Some("agent")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: ApiResponse<UploadAccepted> = test::read_body_json(resp).await;
        assert!(body.success);
        body.data.unwrap().upload_id
    }};
}

async fn wait_for_terminal(state: &AppState, id: &str) -> IngestionProgress {
    for _ in 0..300 {
        if let Some(progress) = state.jobs.progress(id).await {
            assert_eq!(
                progress.processed_rows,
                progress.successful_rows + progress.failed_rows
            );
            assert!(progress.total_rows == 0 || progress.processed_rows <= progress.total_rows);
            if progress.status.is_terminal() {
                return progress;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("upload {id} never reached a terminal state");
}

#[actix_web::test]
async fn all_valid_rows_complete_without_report() {
    let h = harness();
    let app = app!(h);
    let id = upload!(app, "listings.csv", &csv_rows(5, None));

    let done = wait_for_terminal(&h.state, &id).await;
    assert_eq!(done.status, IngestionStatus::Completed);
    assert_eq!(done.total_rows, 5);
    assert_eq!(done.successful_rows, 5);
    assert_eq!(done.failed_rows, 0);
    assert!(!done.has_error_report);
    assert_eq!(h.store.count().unwrap(), 5);

    let req = test::TestRequest::get()
        .uri(&format!("/uploads/bulk/progress/{id}"))
        .to_request();
    let body: ApiResponse<IngestionProgress> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body.data.unwrap().status, IngestionStatus::Completed);
}

#[actix_web::test]
async fn missing_price_on_row_three_is_reported() {
    let h = harness();
    let app = app!(h);
    let id = upload!(app, "listings.csv", &csv_rows(5, Some(3)));

    let done = wait_for_terminal(&h.state, &id).await;
    assert_eq!(done.status, IngestionStatus::Completed);
    assert_eq!(done.successful_rows, 4);
    assert_eq!(done.failed_rows, 1);
    assert!(done.has_error_report);

    let req = test::TestRequest::get()
        .uri(&format!("/uploads/bulk/error-report/{id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("content-type").unwrap().to_str().unwrap().starts_with("text/csv"));
    let disposition = resp.headers().get("content-disposition").unwrap().to_str().unwrap().to_string();
    assert!(disposition.contains(&format!("error_report_{id}.csv")));

    let text = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("row_number,title,"));
    assert!(lines[1].starts_with("3,Listing 3,"));
    assert!(lines[1].ends_with("validation,price: price is required"));
}

#[actix_web::test]
async fn binary_upload_fails_without_rows() {
    let h = harness();
    let app = app!(h);
    let id = upload!(app, "photo.csv", &[0x89, b'P', b'N', b'G', 0x00, 0x00, 0x1a, 0x0a]);

    let done = wait_for_terminal(&h.state, &id).await;
    assert_eq!(done.status, IngestionStatus::Failed);
    assert_eq!(done.total_rows, 0);
    assert_eq!(done.processed_rows, 0);
    assert!(!done.has_error_report);
    assert!(done.error.is_some());
}

#[actix_web::test]
async fn report_keeps_the_uploaded_column_titles() {
    let h = harness();
    let app = app!(h);
    let body = "Title, Property Type ,Listing-Type,Price,Address,City,State,Bedrooms,Bathrooms,Area\n\
Corner Lot,Town House,sale,,9 Quay St,Mobile,AL,3,2,1500\n";
    let id = upload!(app, "listings.csv", body.as_bytes());

    let done = wait_for_terminal(&h.state, &id).await;
    assert_eq!(done.failed_rows, 1);

    let req = test::TestRequest::get()
        .uri(&format!("/uploads/bulk/error-report/{id}"))
        .to_request();
    let text = String::from_utf8(test::call_and_read_body(&app, req).await.to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "row_number,Title,Property Type,Listing-Type,Price,Address,City,State,Bedrooms,Bathrooms,Area,error_kind,error_reason"
    );
    assert!(lines[1].starts_with("1,Corner Lot,Town House,sale,,"));
}

#[actix_web::test]
async fn unknown_upload_is_not_found_and_not_created() {
    let h = harness();
    let app = app!(h);

    let req = test::TestRequest::get()
        .uri("/uploads/bulk/progress/does-not-exist")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: ApiResponse<IngestionProgress> = test::read_body_json(resp).await;
    assert!(!body.success);
    assert_eq!(body.error.unwrap().code, "JOB_NOT_FOUND");
    assert!(h.state.jobs.is_empty().await);
}

#[actix_web::test]
async fn report_for_clean_upload_is_unavailable() {
    let h = harness();
    let app = app!(h);
    let id = upload!(app, "listings.csv", &csv_rows(2, None));
    wait_for_terminal(&h.state, &id).await;

    let req = test::TestRequest::get()
        .uri(&format!("/uploads/bulk/error-report/{id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: ApiResponse<()> = test::read_body_json(resp).await;
    assert_eq!(body.error.unwrap().code, "NO_ERROR_REPORT");
}

#[actix_web::test]
async fn duplicate_listing_fails_only_its_row() {
    let h = harness();
    let app = app!(h);
    let mut content = csv_rows(2, None);
    content.extend_from_slice(b"Listing 1 again,condo,sale,99000,1 Birch Ave,Tulsa,OK,2,1.5,1100\n");
    let id = upload!(app, "listings.csv", &content);

    let done = wait_for_terminal(&h.state, &id).await;
    assert_eq!(done.status, IngestionStatus::Completed);
    assert_eq!(done.successful_rows, 2);
    assert_eq!(done.failed_rows, 1);

    let req = test::TestRequest::get()
        .uri(&format!("/uploads/bulk/error-report/{id}"))
        .to_request();
    let text = String::from_utf8(test::call_and_read_body(&app, req).await.to_vec()).unwrap();
    let failed_line = text.lines().nth(1).unwrap();
    assert!(failed_line.starts_with("3,Listing 1 again,"));
    assert!(failed_line.contains("persistence,"));
    assert!(failed_line.contains("already exists"));
}

#[actix_web::test]
async fn rejected_uploads_create_no_job() {
    let mut config = AppConfig::default();
    config.ingest.max_file_bytes = 64;
    let h = harness_with(config);
    let app = app!(h);

    let cases = [
        (
            upload_request(multipart_body("file", "listings.xlsx", "text/csv", b"a,b\n1,2\n"), Some("agent")),
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "UNSUPPORTED_FILE_TYPE",
        ),
        (
            upload_request(multipart_body("file", "listings.csv", "image/png", b"a,b\n1,2\n"), Some("agent")),
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "UNSUPPORTED_FILE_TYPE",
        ),
        (
            upload_request(multipart_body("file", "listings.csv", "text/csv", &csv_rows(5, None)), Some("agent")),
            StatusCode::PAYLOAD_TOO_LARGE,
            "FILE_TOO_LARGE",
        ),
        (
            upload_request(multipart_body("file", "listings.csv", "text/csv", b""), Some("agent")),
            StatusCode::BAD_REQUEST,
            "EMPTY_FILE",
        ),
        (
            upload_request(multipart_body("document", "listings.csv", "text/csv", b"a,b\n"), Some("agent")),
            StatusCode::BAD_REQUEST,
            "MISSING_FILE",
        ),
        (
            upload_request(multipart_body("file", "listings.csv", "text/csv", b"a,b\n"), None),
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
        ),
        (
            upload_request(multipart_body("file", "listings.csv", "text/csv", b"a,b\n"), Some("tenant")),
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
        ),
    ];

    for (req, status, code) in cases {
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), status, "expected {code}");
        let body: ApiResponse<()> = test::read_body_json(resp).await;
        assert_eq!(body.error.unwrap().code, code);
    }
    assert!(h.state.jobs.is_empty().await);
}

#[actix_web::test]
async fn template_is_stable_across_calls() {
    let h = harness();
    let app = app!(h);

    let mut bodies = Vec::new();
    for _ in 0..3 {
        let req = test::TestRequest::get()
            .uri("/uploads/bulk/properties/template")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("x-template-version").unwrap(), "1");
        bodies.push(test::read_body(resp).await);
    }
    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    assert!(bodies[0].starts_with(b"title,description,property_type"));
}
