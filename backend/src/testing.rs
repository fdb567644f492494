//! Fixtures shared by the unit tests.

use chrono::Utc;
use image::{ImageBuffer, ImageFormat, Rgb};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use leafscan_shared::{ClassificationResult, Label, UserId};
use ndarray::Array4;
use std::io::Cursor;
use std::time::Duration;

use crate::auth::models::{Claims, Role};
use crate::inference::model::{ClassifierError, InferenceBackend, LeafClassifier};

pub fn png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub struct FixedScores(pub Vec<f32>);

impl InferenceBackend for FixedScores {
    fn forward(&self, _input: Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
        Ok(self.0.clone())
    }
}

pub struct SlowClassifier(pub Duration);

impl LeafClassifier for SlowClassifier {
    fn classify(&self, _image: &[u8]) -> Result<ClassificationResult, ClassifierError> {
        std::thread::sleep(self.0);
        Ok(ClassificationResult {
            label: Label::Healthy,
            confidence: 99.0,
        })
    }
}

pub fn issue_token(secret: &str, user_id: UserId, role: Role, valid_for: chrono::Duration) -> String {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.as_str().to_string(),
        exp: (now + valid_for).timestamp() as usize,
        iat: now.timestamp() as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn multipart_body(
    file_field: &str,
    file_name: &str,
    data: &[u8],
    text_fields: &[(&str, &str)],
) -> (String, Vec<u8>) {
    let boundary = "leafscan-test-boundary";
    let mut body = Vec::new();
    for (name, value) in text_fields {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{file_field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
