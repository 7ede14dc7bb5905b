use std::fs;
use std::io::Write;

use http::Method;
use pagoda::{App, ParsedRequest};

fn get(url: &str) -> ParsedRequest {
    ParsedRequest::new(Method::GET, url, Vec::new(), Vec::new())
}

fn write_file(dir: &std::path::Path, rel: &str, content: &[u8]) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut f = fs::File::create(path).unwrap();
    f.write_all(content).unwrap();
}

#[test]
fn test_static_files_round_trip_with_content_types() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "css/site.css", b"body { margin: 0 }");
    write_file(dir.path(), "logo.svg", b"<svg/>");
    write_file(dir.path(), "data.bin", &[0, 1, 2, 3]);

    let service = App::new().static_dir(dir.path()).into_service();

    let parts = service.process(get("/css/site.css"));
    assert_eq!(parts.status_code(), 200);
    assert_eq!(parts.body, b"body { margin: 0 }");
    assert_eq!(parts.content_type.as_deref(), Some("text/css"));

    let parts = service.process(get("/logo.svg"));
    assert_eq!(parts.content_type.as_deref(), Some("image/svg+xml"));

    // Unknown extension: bytes pass through without a content-type override.
    let parts = service.process(get("/data.bin"));
    assert_eq!(parts.body, vec![0, 1, 2, 3]);
    assert_eq!(parts.content_type, None);
}

#[test]
fn test_index_html_takes_over_the_root() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "index.html", b"<html>landing</html>");

    let service = App::new().static_dir(dir.path()).into_service();
    let parts = service.process(get("/"));
    assert_eq!(parts.body, b"<html>landing</html>");
    assert_eq!(parts.content_type.as_deref(), Some("text/html"));
}

#[test]
fn test_missing_static_file_is_404() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "present.css", b"");

    let service = App::new().static_dir(dir.path()).into_service();
    let parts = service.process(get("/absent.css"));
    assert_eq!(parts.status_code(), 404);
}

#[test]
fn test_view_template_from_disk() {
    use pagoda::{FnController, RequestContext};
    use serde_json::json;
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "greeting.html", b"<h1>Hello {{name}}</h1>");

    let service = App::new()
        .templates_dir(dir.path())
        .controller(
            "/greet",
            Arc::new(FnController::new(|ctx: &mut RequestContext| {
                ctx.view("greeting", Some(&json!({ "name": "Ada" })))
            })),
        )
        .unwrap()
        .into_service();

    let parts = service.process(get("/greet"));
    assert_eq!(parts.status_code(), 200);
    assert_eq!(parts.content_type.as_deref(), Some("text/html"));
    assert_eq!(parts.body, b"<h1>Hello Ada</h1>");
}

#[test]
fn test_container_value_reaches_handlers() {
    use pagoda::{FnController, RequestContext};
    use std::sync::Arc;

    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "db_url: postgres://localhost/app").unwrap();

    let service = App::new()
        .container_file(f.path())
        .controller(
            "/di",
            Arc::new(FnController::new(|ctx: &mut RequestContext| {
                let value = ctx.container()["db_url"].clone();
                ctx.json(serde_json::json!({ "db_url": value }))
            })),
        )
        .unwrap()
        .into_service();

    let parts = service.process(get("/di"));
    assert_eq!(parts.body, br#"{"db_url":"postgres://localhost/app"}"#);
}
