pub mod utils;

use image::GenericImageView;
use reqwest::StatusCode;
use utils::spawn_live_server;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::{
    client::{ClientError, ClientFile, ToolClient, ToolResponse},
    imaging::{
        TargetFormat,
        compose::{Background, merge_background},
    },
    storage::StorageProvider,
    test_utils::{create_test_config, sample_jpeg, sample_png},
    tools::ToolRequest,
};

fn binary(response: ToolResponse) -> (String, bytes::Bytes) {
    match response {
        ToolResponse::Binary { content_type, bytes } => (content_type, bytes),
        other => panic!("expected a file, got {other:?}"),
    }
}

/// Every image tool, driven through the client against a live server.
#[test_log::test(tokio::test)]
async fn test_e2e_client_runs_every_image_tool() {
    let dir = tempfile::tempdir().unwrap();
    let server = spawn_live_server(create_test_config(dir.path())).await;
    let client = ToolClient::new(server.base_url()).unwrap();
    let photo = || ClientFile::new("photo.jpg", sample_jpeg(200, 100));

    let (content_type, bytes) = binary(client.invoke(&ToolRequest::Compress { quality: 40 }, vec![photo()]).await.unwrap());
    assert_eq!(content_type, "image/jpeg");
    assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Jpeg);

    let (content_type, bytes) = binary(
        client
            .invoke(&ToolRequest::ConvertFormat { format: TargetFormat::Png }, vec![photo()])
            .await
            .unwrap(),
    );
    assert_eq!(content_type, "image/png");
    assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Png);

    let (content_type, _) = binary(client.invoke(&ToolRequest::WebpConvert { quality: 70 }, vec![photo()]).await.unwrap());
    assert_eq!(content_type, "image/webp");

    let (content_type, bytes) = binary(
        client
            .invoke(
                &ToolRequest::Resize {
                    width: Some(50),
                    height: None,
                },
                vec![photo()],
            )
            .await
            .unwrap(),
    );
    assert_eq!(content_type, "image/jpeg");
    assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (50, 25));

    let (_, bytes) = binary(
        client
            .invoke(
                &ToolRequest::Rotate {
                    angle: 90,
                    flip: false,
                    flop: true,
                },
                vec![photo()],
            )
            .await
            .unwrap(),
    );
    assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (100, 200));

    let (content_type, bytes) = binary(
        client
            .invoke(
                &ToolRequest::Watermark {
                    text: "tooldack".to_string(),
                    opacity: 0.8,
                },
                vec![photo()],
            )
            .await
            .unwrap(),
    );
    assert_eq!(content_type, "image/jpeg");
    assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (200, 100));

    let pages = vec![
        ClientFile::new("1.png", sample_png(300, 200)),
        ClientFile::new("2.jpg", sample_jpeg(100, 400)),
        ClientFile::new("3.png", sample_png(50, 50)),
    ];
    let (content_type, bytes) = binary(client.invoke(&ToolRequest::ImageToPdf, pages).await.unwrap());
    assert_eq!(content_type, "application/pdf");
    let document = lopdf::Document::load_mem(&bytes).unwrap();
    assert_eq!(document.get_pages().len(), 3);
}

/// Store-and-link with local storage: the returned link serves the exact bytes uploaded.
#[tokio::test]
async fn test_e2e_upload_link_serves_original_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let server = spawn_live_server(create_test_config(dir.path())).await;
    let client = ToolClient::new(server.base_url()).unwrap();
    let original = sample_png(32, 32);

    let stored = match client
        .invoke(&ToolRequest::Upload, vec![ClientFile::new("logo.png", original.clone())])
        .await
        .unwrap()
    {
        ToolResponse::Stored(stored) => stored,
        other => panic!("expected a link, got {other:?}"),
    };

    assert_eq!(stored.provider, StorageProvider::Local);
    assert_eq!(stored.mimetype, "image/png");
    assert_eq!(stored.size, original.len() as u64);
    assert!(stored.url.starts_with(&format!("{}u/", server.base_url())));
    assert!(stored.filename.ends_with(".png"));
    assert!(server.config.storage.uploads_dir.join(&stored.filename).is_file());

    let fetched = reqwest::get(&stored.url).await.unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(fetched.bytes().await.unwrap().as_ref(), original.as_slice());
}

/// Remote background removal followed by local compositing onto a solid colour.
#[tokio::test]
async fn test_e2e_remove_background_then_merge_locally() {
    let upstream = MockServer::start().await;
    let cutout = {
        let mut img = image::RgbaImage::from_pixel(20, 10, image::Rgba([0, 0, 0, 0]));
        for x in 5..15 {
            for y in 2..8 {
                img.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
            }
        }
        crate::imaging::encode_png(&image::DynamicImage::ImageRgba8(img)).unwrap()
    };
    Mock::given(method("POST"))
        .and(path("/v1.0/removebg"))
        .and(header("X-Api-Key", "rbg-test"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(cutout.clone()))
        .expect(1)
        .mount(&upstream)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config.background_removal.api_key = Some("rbg-test".to_string());
    config.background_removal.endpoint = format!("{}/v1.0/removebg", upstream.uri()).parse().unwrap();
    let server = spawn_live_server(config).await;
    let client = ToolClient::new(server.base_url()).unwrap();

    let (content_type, bytes) = binary(
        client
            .invoke(&ToolRequest::RemoveBackground, vec![ClientFile::new("p.jpg", sample_jpeg(20, 10))])
            .await
            .unwrap(),
    );
    assert_eq!(content_type, "image/png");
    assert_eq!(bytes.as_ref(), cutout.as_slice());

    let white = Background::parse_color("#ffffff").unwrap();
    let merged = image::load_from_memory(&merge_background(&bytes, &white, 1.0).unwrap())
        .unwrap()
        .to_rgba8();
    assert_eq!(merged.dimensions(), (20, 10));
    assert_eq!(*merged.get_pixel(0, 0), image::Rgba([255, 255, 255, 255]));
    assert_eq!(*merged.get_pixel(10, 5), image::Rgba([255, 0, 0, 255]));
}

/// Server-side failures arrive at the client as readable messages.
#[tokio::test]
async fn test_e2e_errors_reach_the_client() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config.limits.max_file_size = 1024;
    let server = spawn_live_server(config).await;
    let client = ToolClient::new(server.base_url()).unwrap();

    let err = client
        .invoke(
            &ToolRequest::Compress { quality: 80 },
            vec![ClientFile::new("big.bin", vec![0u8; 4096])],
        )
        .await
        .unwrap_err();
    match err {
        ClientError::Server { status, message } => {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(message.contains("File too large"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let err = client
        .invoke(&ToolRequest::RemoveBackground, vec![ClientFile::new("p.png", sample_png(4, 4))])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "REMOVE_BG_API_KEY not configured");

    let err = client
        .invoke(
            &ToolRequest::Rotate {
                angle: 90,
                flip: false,
                flop: false,
            },
            vec![ClientFile::new("notes.txt", b"definitely not an image".to_vec())],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Server { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));
    assert!(!err.to_string().is_empty());
}

#[tokio::test]
async fn test_e2e_health_and_retired_routes() {
    let dir = tempfile::tempdir().unwrap();
    let server = spawn_live_server(create_test_config(dir.path())).await;
    let client = ToolClient::new(server.base_url()).unwrap();

    assert_eq!(client.health().await.unwrap().status, "ok");

    let response = reqwest::Client::new()
        .post(format!("{}api/image-to-prompt", server.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("moved to the frontend"));
}
