//! HTTP clients for a detection/OCR service
//!
//! Frames go up as multipart JPEG uploads. The detector answers
//! `{meta, dets}`; the OCR endpoint answers `{"data": ...}`.

use std::io::Cursor;
use std::net::IpAddr;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use reqwest::blocking::{multipart, Client, Response};
use serde::Deserialize;

use super::{DetectParams, Detection, DetectionMeta, Detector, Ocr, PerceptionError};
use crate::config::PerceptionSettings;

const JPEG_QUALITY: u8 = 95;

fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, PerceptionError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(Cursor::new(&mut buf), JPEG_QUALITY).encode_image(image)?;
    Ok(buf)
}

fn image_part(image: &RgbImage) -> Result<multipart::Part, PerceptionError> {
    Ok(multipart::Part::bytes(encode_jpeg(image)?)
        .file_name("image.jpg")
        .mime_str("image/jpeg")?)
}

/// Whether `base_url` points at this machine
fn is_loopback(base_url: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(base_url) else {
        return false;
    };
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

fn build_client(cfg: &PerceptionSettings) -> Result<Client, PerceptionError> {
    let mut builder = Client::builder().timeout(Duration::from_millis(cfg.request_timeout_ms));
    // A local service must not be routed through an environment proxy.
    if is_loopback(&cfg.base_url) {
        builder = builder.no_proxy();
    }
    Ok(builder.build()?)
}

fn check_status(resp: Response) -> Result<Response, PerceptionError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let mut body = resp.text().unwrap_or_default();
    body.truncate(2000);
    Err(PerceptionError::Status {
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    meta: Option<DetectionMeta>,
    #[serde(default)]
    dets: Vec<Detection>,
}

/// Detector backed by `POST {base}/yolo`
pub struct RemoteDetector {
    client: Client,
    url: String,
    weights_path: Option<String>,
}

impl RemoteDetector {
    pub fn new(cfg: &PerceptionSettings) -> Result<Self, PerceptionError> {
        Ok(Self {
            client: build_client(cfg)?,
            url: format!("{}/yolo", cfg.base_url.trim_end_matches('/')),
            weights_path: cfg.weights_path.clone(),
        })
    }
}

impl Detector for RemoteDetector {
    fn detect(
        &self,
        image: &RgbImage,
        params: &DetectParams,
        tag: &str,
    ) -> Result<(DetectionMeta, Vec<Detection>), PerceptionError> {
        let mut form = multipart::Form::new()
            .text("imgsz", params.imgsz.to_string())
            .text("conf", params.conf.to_string())
            .text("iou", params.iou.to_string())
            .text("tag", tag.to_string())
            .text("agent", params.agent.clone());
        if let Some(weights) = &self.weights_path {
            form = form.text("weights_path", weights.clone());
        }
        let form = form.part("file", image_part(image)?);

        let resp = check_status(self.client.post(&self.url).multipart(form).send()?)?;
        let parsed: DetectResponse = resp.json()?;

        let mut meta = parsed.meta.unwrap_or_else(|| DetectionMeta {
            backend: Some("remote".to_string()),
            imgsz: Some(params.imgsz),
            conf: Some(params.conf),
            iou: Some(params.iou),
            ..DetectionMeta::default()
        });
        meta.tag.get_or_insert_with(|| tag.to_string());
        if !params.agent.is_empty() {
            meta.agent.get_or_insert_with(|| params.agent.clone());
        }
        log::trace!("[RemoteDetector] '{}' -> {} detections", tag, parsed.dets.len());
        Ok((meta, parsed.dets))
    }
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    data: serde_json::Value,
}

/// OCR backed by `POST {base}/ocr`
pub struct RemoteOcr {
    client: Client,
    url: String,
}

impl RemoteOcr {
    pub fn new(cfg: &PerceptionSettings) -> Result<Self, PerceptionError> {
        Ok(Self {
            client: build_client(cfg)?,
            url: format!("{}/ocr", cfg.base_url.trim_end_matches('/')),
        })
    }

    fn post(&self, form: multipart::Form) -> Result<serde_json::Value, PerceptionError> {
        let resp = check_status(self.client.post(&self.url).multipart(form).send()?)?;
        let body: serde_json::Value = resp.json()?;
        serde_json::from_value::<OcrResponse>(body.clone())
            .map(|r| r.data)
            .map_err(|_| PerceptionError::Malformed(format!("unexpected response shape: {body}")))
    }
}

impl Ocr for RemoteOcr {
    fn text(&self, image: &RgbImage, min_conf: f32) -> Result<String, PerceptionError> {
        let form = multipart::Form::new()
            .text("mode", "text")
            .text("joiner", " ")
            .text("min_conf", min_conf.to_string())
            .part("file", image_part(image)?);
        match self.post(form)? {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Null => Ok(String::new()),
            other => Err(PerceptionError::Malformed(format!("text is not a string: {other}"))),
        }
    }

    fn digits(&self, image: &RgbImage) -> Result<i64, PerceptionError> {
        let form = multipart::Form::new()
            .text("mode", "digits")
            .part("file", image_part(image)?);
        parse_digits(&self.post(form)?)
    }
}

/// The service may answer digits as a JSON number or a numeric string
fn parse_digits(value: &serde_json::Value) -> Result<i64, PerceptionError> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| PerceptionError::Malformed(format!("not a number: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Serve one canned response, handing the raw request back to the test
    fn serve_once(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let reply = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(reply.as_bytes()).unwrap();
            let _ = tx.send(request);
        });
        (format!("http://{addr}"), rx)
    }

    fn read_request(stream: &mut std::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            let Some(head_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let head = text[..head_end].to_ascii_lowercase();
            let body_len = buf.len() - head_end - 4;
            if let Some(len) = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
            {
                if body_len >= len {
                    break;
                }
            } else if buf.ends_with(b"0\r\n\r\n") {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn settings(base_url: String) -> PerceptionSettings {
        PerceptionSettings {
            base_url,
            request_timeout_ms: 5000,
            ..PerceptionSettings::default()
        }
    }

    #[test]
    fn test_detector_posts_multipart_and_parses() {
        let (url, rx) = serve_once(
            "200 OK",
            r#"{"meta":{"backend":"torch","imgsz":832},"dets":[{"xyxy":[10,20,110,60],"name":"button_green","conf":0.93}]}"#,
        );
        let detector = RemoteDetector::new(&settings(url)).unwrap();
        let (meta, dets) = detector
            .detect(&RgbImage::new(32, 32), &DetectParams::default(), "career_nav_next")
            .unwrap();

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].name, "button_green");
        assert_eq!(meta.backend.as_deref(), Some("torch"));
        assert_eq!(meta.tag.as_deref(), Some("career_nav_next"));

        let request = rx.recv().unwrap();
        assert!(request.starts_with("POST /yolo "));
        assert!(request.contains("name=\"tag\""));
        assert!(request.contains("career_nav_next"));
        assert!(request.contains("filename=\"image.jpg\""));
    }

    #[test]
    fn test_ocr_text_and_bad_status() {
        let (url, _rx) = serve_once("200 OK", r#"{"data":"Start Career!"}"#);
        let ocr = RemoteOcr::new(&settings(url)).unwrap();
        assert_eq!(ocr.text(&RgbImage::new(8, 8), 0.2).unwrap(), "Start Career!");

        let (url, _rx) = serve_once("500 Internal Server Error", r#"{"detail":"boom"}"#);
        let ocr = RemoteOcr::new(&settings(url)).unwrap();
        match ocr.text(&RgbImage::new(8, 8), 0.2) {
            Err(PerceptionError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ocr_rejects_missing_data() {
        let (url, _rx) = serve_once("200 OK", r#"{"result":"x"}"#);
        let ocr = RemoteOcr::new(&settings(url)).unwrap();
        assert!(matches!(
            ocr.digits(&RgbImage::new(8, 8)),
            Err(PerceptionError::Malformed(_))
        ));
    }

    #[test]
    fn test_is_loopback() {
        assert!(is_loopback("http://127.0.0.1:8001"));
        assert!(is_loopback("http://localhost:8001/"));
        assert!(is_loopback("http://[::1]:8001"));
        assert!(!is_loopback("http://10.0.0.5:8001"));
        assert!(!is_loopback("not a url"));
    }

    #[test]
    fn test_parse_digits_forms() {
        assert_eq!(parse_digits(&serde_json::json!(50)).unwrap(), 50);
        assert_eq!(parse_digits(&serde_json::json!(" 45 ")).unwrap(), 45);
        assert!(parse_digits(&serde_json::json!("Lv")).is_err());
    }
}
