use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::Path;

use actix_web::http::header;
use actix_web::web::Bytes;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use satstac::s3::Credentials;
use satstac::{Config, Downloader, StacError};

const THUMBNAIL: &[u8] = b"\xff\xd8\xff\xe0 not really a jpeg";

/// Serves [`THUMBNAIL`] to unsigned requests only.
async fn unsigned_only(req: HttpRequest) -> HttpResponse {
    if req.headers().contains_key(header::AUTHORIZATION) {
        HttpResponse::Forbidden().body("AccessDenied")
    } else {
        HttpResponse::Ok().body(THUMBNAIL)
    }
}

/// Sends a few bytes, then drops the connection.
async fn broken() -> HttpResponse {
    HttpResponse::Ok().streaming(futures::stream::iter([
        Ok::<_, io::Error>(Bytes::from_static(b"II*\0partial")),
        Err(io::Error::other("connection reset")),
    ]))
}

async fn serve() -> SocketAddr {
    let server = HttpServer::new(|| {
        App::new()
            .route("/c1/L8/139/045/thumb_small.jpg", web::get().to(unsigned_only))
            .route("/mirror/s3.amazonaws.com/B1.TIF", web::get().to(unsigned_only))
            .route("/broken/B1.TIF", web::get().to(broken))
            .default_service(web::to(|| async {
                HttpResponse::NotFound().body("NoSuchKey")
            }))
    })
    .workers(1)
    .bind("127.0.0.1:0")
    .unwrap();
    let addr = server.addrs()[0];
    actix_rt::spawn(server.run());
    addr
}

fn downloader(dir: &Path, credentials: Option<Credentials>) -> Downloader {
    let config = Config {
        download_dir: Some(dir.to_path_buf()),
        ..Config::default()
    };
    Downloader::new(&config, credentials).unwrap()
}

fn credentials() -> Credentials {
    Credentials {
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
    }
}

#[actix_rt::test]
#[tracing_test::traced_test]
async fn download_to_explicit_path() {
    let addr = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested").join("scenes").join("thumb.jpg");

    let url = format!("http://{addr}/c1/L8/139/045/thumb_small.jpg");
    let path = downloader(dir.path(), None).download(&url, Some(&target)).await.unwrap();
    assert_eq!(path, target);
    assert_eq!(fs::read(&path).unwrap(), THUMBNAIL);
}

#[actix_rt::test]
async fn download_to_default_name() {
    let addr = serve().await;
    let dir = tempfile::tempdir().unwrap();

    let url = format!("http://{addr}/c1/L8/139/045/thumb_small.jpg");
    let path = downloader(dir.path(), None).download(&url, None).await.unwrap();
    assert_eq!(path, dir.path().join("thumb_small.jpg"));
    assert_eq!(fs::read(&path).unwrap(), THUMBNAIL);
}

#[actix_rt::test]
async fn missing_object() {
    let addr = serve().await;
    let dir = tempfile::tempdir().unwrap();

    let url = format!("http://{addr}/c1/L8/139/045/B12.TIF");
    let err = downloader(dir.path(), None).download(&url, None).await.unwrap_err();
    let StacError::DownloadFailed(failed_url, body) = err else {
        panic!("expected DownloadFailed, got {err:?}");
    };
    assert_eq!(failed_url, url);
    assert_eq!(body, "NoSuchKey");
    assert!(!dir.path().join("B12.TIF").exists());
}

#[actix_rt::test]
async fn unsignable_s3_url_is_fetched_unsigned() {
    let addr = serve().await;
    let dir = tempfile::tempdir().unwrap();

    let url = format!("http://{addr}/mirror/s3.amazonaws.com/B1.TIF");
    let path = downloader(dir.path(), Some(credentials()))
        .download(&url, None)
        .await
        .unwrap();
    assert_eq!(path, dir.path().join("B1.TIF"));
    assert_eq!(fs::read(&path).unwrap(), THUMBNAIL);
}

#[actix_rt::test]
async fn other_urls_are_never_signed() {
    let addr = serve().await;
    let dir = tempfile::tempdir().unwrap();

    let url = format!("http://{addr}/c1/L8/139/045/thumb_small.jpg");
    let path = downloader(dir.path(), Some(credentials()))
        .download(&url, None)
        .await
        .unwrap();
    assert_eq!(fs::read(&path).unwrap(), THUMBNAIL);
}

#[actix_rt::test]
async fn interrupted_download_leaves_no_file() {
    let addr = serve().await;
    let dir = tempfile::tempdir().unwrap();

    let url = format!("http://{addr}/broken/B1.TIF");
    let err = downloader(dir.path(), None).download(&url, None).await.unwrap_err();
    assert!(matches!(err, StacError::HttpError(_)), "unexpected error {err:?}");
    assert!(!dir.path().join("B1.TIF").exists());
}
