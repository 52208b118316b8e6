// Shared fixtures for the integration tests

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use serde_json::Value;
use std::io::Cursor;
use tempfile::TempDir;
use tessera_core::ServiceConfig;
use tessera_server::{http::{create_router, ApiState}, startup::build_state};
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: ApiState,
    pub dir: TempDir,
}

pub fn test_config(dir: &TempDir) -> ServiceConfig {
    ServiceConfig {
        upload_path: dir.path().to_string_lossy().into_owned(),
        ..ServiceConfig::default()
    }
}

pub async fn spawn_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    spawn_app_with(test_config(&dir), dir).await
}

pub async fn spawn_app_with(config: ServiceConfig, dir: TempDir) -> TestApp {
    let state = build_state(config).await.unwrap();
    TestApp {
        router: create_router(state.clone()),
        state,
        dir,
    }
}

/// Dark left half, bright right half.
pub fn two_tone(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([20, 30, 40])
        } else {
            Rgb([230, 220, 210])
        }
    })
}

/// Pixels that do not compress well.
pub fn noise(width: u32, height: u32) -> RgbImage {
    let mut state: u32 = 0x2545_f491;
    RgbImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    })
}

pub fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    buf.into_inner()
}

impl TestApp {
    /// Put an image straight into the upload directory under `id`.
    pub fn seed_image(&self, id: &str, image: &RgbImage) {
        std::fs::write(self.dir.path().join(format!("{}.png", id)), png_bytes(image)).unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::delete(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn upload(&self, filename: &str, content_type: &str, data: &[u8]) -> (StatusCode, Value) {
        let boundary = "tessera-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                filename, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        self.send(
            Request::post("/api/v1/images/upload")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }
}
