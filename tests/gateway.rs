//! Integration tests for the job orchestrator.
//!
//! External tools are replaced by fakes: a recording transport, in-process
//! converters, and (on Unix) a shell script standing in for LibreOffice.
//! The pdfium scenarios are gated behind `PDFIUM_LIB_PATH`.
//!
//! Run with:
//!   cargo test --test gateway -- --nocapture
//!
//! Include pdfium scenarios:
//!   PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test gateway

use async_trait::async_trait;
use fileconv_gateway::converters::{ImageToWord, TextRecognizer};
use fileconv_gateway::{
    Action, Artifact, Category, Converter, ConverterError, DeliveryError, Gateway, GatewayConfig,
    GatewayError, JobOutcome, JobStatus, MessageRef, Transport, UserId,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingTransport {
    statuses: Mutex<Vec<(UserId, String)>>,
    delivered: Mutex<Vec<(UserId, Artifact)>>,
    fail_delivery: bool,
}

impl RecordingTransport {
    fn failing() -> Self {
        Self {
            fail_delivery: true,
            ..Self::default()
        }
    }

    fn statuses_for(&self, user: UserId) -> Vec<String> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, s)| s.clone())
            .collect()
    }

    fn delivered(&self) -> Vec<(UserId, Artifact)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn update_status(
        &self,
        user: UserId,
        _message: &MessageRef,
        status: &JobStatus,
    ) -> Result<(), DeliveryError> {
        self.statuses.lock().unwrap().push((user, status.to_string()));
        Ok(())
    }

    async fn deliver(&self, user: UserId, artifact: Artifact) -> Result<(), DeliveryError> {
        if self.fail_delivery {
            return Err(DeliveryError::new("chat service unavailable"));
        }
        self.delivered.lock().unwrap().push((user, artifact));
        Ok(())
    }
}

/// Copies the input to the output, optionally after a delay.
struct CopyConverter {
    delay: Duration,
    calls: AtomicUsize,
}

impl CopyConverter {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Converter for CopyConverter {
    fn name(&self) -> &'static str {
        "copy"
    }

    async fn convert(&self, input: &Path, output: &Path) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        tokio::fs::copy(input, output).await.is_ok()
    }
}

/// Reports success without writing anything.
struct LyingConverter;

#[async_trait]
impl Converter for LyingConverter {
    fn name(&self) -> &'static str {
        "lying"
    }

    async fn convert(&self, _input: &Path, _output: &Path) -> bool {
        true
    }
}

struct NoText;

#[async_trait]
impl TextRecognizer for NoText {
    async fn recognize(&self, _image: &Path) -> Result<String, ConverterError> {
        Ok(String::new())
    }
}

fn config(dir: &Path) -> GatewayConfig {
    GatewayConfig::builder()
        .temp_root(dir.join("tmp"))
        .office_command("no-such-office-suite-5e1b")
        .ocr_command("no-such-ocr-engine-5e1b")
        .process_timeout_secs(20)
        .build()
        .unwrap()
}

fn temp_entries(gateway: &Gateway) -> Vec<PathBuf> {
    match std::fs::read_dir(gateway.temp().root()) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

fn msg() -> MessageRef {
    MessageRef::new("status-1")
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([20, 40, 200, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 10]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .unwrap();
    buf
}

fn zip_entry(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut s = String::new();
    entry.read_to_string(&mut s).unwrap();
    s
}

// ── Upload ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_upload_offers_pdf_actions() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let gateway = Gateway::new(config(dir.path()), transport.clone());

    let staged = gateway
        .on_file_received(1, msg(), &b"%PDF-1.4\n"[..], "report.pdf")
        .await
        .unwrap();

    assert_eq!(staged.category, Category::Pdf);
    let ids: Vec<_> = staged.choices.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["pdf_to_docx", "pdf_to_image"]);

    assert!(gateway.sessions().contains(1));
    let entries = temp_entries(&gateway);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].extension().unwrap(), "pdf");
    assert_eq!(std::fs::read(&entries[0]).unwrap(), b"%PDF-1.4\n");

    assert_eq!(
        transport.statuses_for(1),
        [
            "⏳ Downloading file...",
            "✅ File 'report.pdf' received! Choose conversion type:"
        ]
    );
}

#[tokio::test]
async fn unsupported_upload_is_rejected_without_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let gateway = Gateway::new(config(dir.path()), transport.clone());

    let err = gateway
        .on_file_received(1, msg(), &b"hello"[..], "Notes.TXT")
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::UnsupportedFormat { ref extension } if extension == ".txt"));
    assert!(!gateway.sessions().contains(1));
    assert!(temp_entries(&gateway).is_empty());
    assert_eq!(
        transport.statuses_for(1),
        ["❌ Unsupported format (.txt). Try PDF, Word, Excel, or Image."]
    );
}

#[tokio::test]
async fn second_upload_replaces_and_releases_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Gateway::new(config(dir.path()), Arc::new(RecordingTransport::default()));

    gateway
        .on_file_received(5, msg(), &b"first"[..], "first.pdf")
        .await
        .unwrap();
    let first_path = gateway.sessions().peek(5).unwrap().input_path;

    let staged = gateway
        .on_file_received(5, msg(), &b"second"[..], "second.xlsx")
        .await
        .unwrap();

    assert_eq!(staged.category, Category::Excel);
    assert_eq!(gateway.sessions().len(), 1);
    assert_eq!(gateway.sessions().peek(5).unwrap().original_filename, "second.xlsx");
    assert!(!first_path.exists(), "replaced upload must be deleted");
    assert_eq!(temp_entries(&gateway).len(), 1);
}

#[tokio::test]
async fn photo_upload_is_staged_as_image_jpg() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let gateway = Gateway::new(config(dir.path()), transport.clone());

    let jpeg = jpeg_bytes(40, 30);
    let staged = gateway
        .on_photo_received(3, msg(), jpeg.as_slice())
        .await
        .unwrap();
    assert_eq!(staged.category, Category::Image);
    assert_eq!(staged.choices.len(), 3);
    assert_eq!(
        transport.statuses_for(3),
        [
            "⏳ Downloading image...",
            "✅ Image received! Choose conversion type:"
        ]
    );

    let outcome = gateway
        .on_action_selected(3, msg(), "image_to_pdf")
        .await
        .unwrap();
    assert!(matches!(outcome, JobOutcome::Delivered { ref filename, .. } if filename == "image.pdf"));
}

// ── Selection ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn selection_without_upload_is_no_active_session() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let gateway = Gateway::new(config(dir.path()), transport.clone());

    let err = gateway
        .on_action_selected(9, msg(), "pdf_to_docx")
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::NoActiveSession { user: 9 }));
    assert_eq!(
        transport.statuses_for(9),
        ["❌ No active file found. Please upload the file again."]
    );
}

#[tokio::test]
async fn unknown_action_leaves_session_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let gateway = Gateway::new(config(dir.path()), transport.clone());
    gateway
        .on_file_received(1, msg(), &b"%PDF"[..], "a.pdf")
        .await
        .unwrap();

    let err = gateway
        .on_action_selected(1, msg(), "pdf_to_epub")
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::UnknownAction(ref id) if id == "pdf_to_epub"));
    assert!(gateway.sessions().contains(1));
    assert_eq!(temp_entries(&gateway).len(), 1);
    assert_eq!(
        transport.statuses_for(1).last().unwrap(),
        "❌ Conversion failed. Please try again later or check the file."
    );
}

#[tokio::test]
async fn mismatched_action_restores_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let copy = CopyConverter::new(Duration::ZERO);
    let transport = Arc::new(RecordingTransport::default());
    let gateway = Gateway::with_registry(config(dir.path()), transport.clone(), |r| {
        r.with_converter(Action::PdfToDocx, copy.clone())
    });
    gateway
        .on_file_received(1, msg(), &b"%PDF"[..], "a.pdf")
        .await
        .unwrap();

    let err = gateway
        .on_action_selected(1, msg(), "image_to_pdf")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::ActionNotApplicable { ref action, ref category }
            if action == "image_to_pdf" && category == "pdf"
    ));
    assert!(gateway.sessions().contains(1));
    assert_eq!(
        transport.statuses_for(1).last().unwrap(),
        "❌ Conversion failed. Please try again later or check the file."
    );

    let outcome = gateway
        .on_action_selected(1, msg(), "pdf_to_docx")
        .await
        .unwrap();
    assert!(outcome.is_delivered());
    assert_eq!(copy.calls.load(Ordering::SeqCst), 1);
}

// ── Jobs ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_office_tool_fails_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let gateway = Gateway::new(config(dir.path()), transport.clone());
    gateway
        .on_file_received(2, msg(), &b"PK fake docx"[..], "memo.docx")
        .await
        .unwrap();
    assert_eq!(temp_entries(&gateway).len(), 1);

    let outcome = gateway
        .on_action_selected(2, msg(), "docx_to_pdf")
        .await
        .unwrap();

    assert_eq!(outcome, JobOutcome::ConversionFailed);
    assert!(!gateway.sessions().contains(2));
    assert!(temp_entries(&gateway).is_empty(), "input and output released");
    assert!(transport.delivered().is_empty());
    let statuses = transport.statuses_for(2);
    assert_eq!(statuses[statuses.len() - 2], "⚙️ Converting file... Please wait.");
    assert_eq!(
        statuses.last().unwrap(),
        "❌ Conversion failed. Please try again later or check the file."
    );
}

#[tokio::test]
async fn success_without_output_is_conversion_failure() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Gateway::with_registry(
        config(dir.path()),
        Arc::new(RecordingTransport::default()),
        |r| r.with_converter(Action::ExcelToPdf, Arc::new(LyingConverter)),
    );
    gateway
        .on_file_received(1, msg(), &b"x"[..], "q3.xlsx")
        .await
        .unwrap();
    let outcome = gateway
        .on_action_selected(1, msg(), "excel_to_pdf")
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::ConversionFailed);
    assert!(temp_entries(&gateway).is_empty());
}

#[tokio::test]
async fn textless_image_to_word_embeds_the_picture() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let gateway = Gateway::with_registry(config(dir.path()), transport.clone(), |r| {
        r.with_converter(Action::ImageToWord, Arc::new(ImageToWord::new(Arc::new(NoText))))
    });

    let png = png_bytes(64, 32);
    gateway
        .on_file_received(4, msg(), png.as_slice(), "scan.png")
        .await
        .unwrap();
    let outcome = gateway
        .on_action_selected(4, msg(), "image_to_word")
        .await
        .unwrap();

    assert!(matches!(outcome, JobOutcome::Delivered { ref filename, .. } if filename == "scan.docx"));
    let (_, artifact) = transport.delivered().pop().unwrap();
    let document = zip_entry(&artifact.bytes, "word/document.xml");
    assert!(document.contains("No text could be extracted from the image. Embedded image below:"));
    assert!(document.contains("<wp:inline"));
    assert!(temp_entries(&gateway).is_empty());
}

#[tokio::test]
async fn image_to_pdf_round_trip_png_and_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let gateway = Gateway::new(config(dir.path()), transport.clone());

    for (user, name, bytes) in [
        (10, "logo.PNG", png_bytes(120, 80)),
        (11, "photo.jpeg", jpeg_bytes(90, 60)),
    ] {
        gateway
            .on_file_received(user, msg(), bytes.as_slice(), name)
            .await
            .unwrap();
        let outcome = gateway
            .on_action_selected(user, msg(), "image_to_pdf")
            .await
            .unwrap();
        assert!(outcome.is_delivered(), "{name}: {outcome:?}");
    }

    let delivered = transport.delivered();
    assert_eq!(delivered.len(), 2);
    for (_, artifact) in &delivered {
        assert!(artifact.bytes.starts_with(b"%PDF"));
        let doc = lopdf::Document::load_mem(&artifact.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }
    let names: Vec<_> = delivered.iter().map(|(_, a)| a.filename.as_str()).collect();
    assert_eq!(names, ["logo.pdf", "photo.pdf"]);
    assert!(temp_entries(&gateway).is_empty());
}

#[tokio::test]
async fn delivery_failure_is_reported_separately() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::failing());
    let gateway = Gateway::new(config(dir.path()), transport.clone());

    let png = png_bytes(10, 10);
    gateway
        .on_file_received(6, msg(), png.as_slice(), "dot.png")
        .await
        .unwrap();
    let outcome = gateway
        .on_action_selected(6, msg(), "image_to_pdf")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        JobOutcome::DeliveryFailed {
            reason: "chat service unavailable".into()
        }
    );
    assert_eq!(
        transport.statuses_for(6).last().unwrap(),
        "❌ Error sending converted file."
    );
    assert!(temp_entries(&gateway).is_empty());
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_selections_run_the_job_once() {
    let dir = tempfile::tempdir().unwrap();
    let copy = CopyConverter::new(Duration::from_millis(100));
    let gateway = Gateway::with_registry(
        config(dir.path()),
        Arc::new(RecordingTransport::default()),
        |r| r.with_converter(Action::PdfToDocx, copy.clone()),
    );
    gateway
        .on_file_received(1, msg(), &b"%PDF"[..], "a.pdf")
        .await
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.on_action_selected(1, msg(), "pdf_to_docx").await })
        })
        .collect();

    let mut delivered = 0;
    let mut no_session = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) if outcome.is_delivered() => delivered += 1,
            Err(GatewayError::NoActiveSession { .. }) => no_session += 1,
            other => panic!("unexpected result: {other:?}"),
        }
    }
    assert_eq!((delivered, no_session), (1, 3));
    assert_eq!(copy.calls.load(Ordering::SeqCst), 1);
    assert!(temp_entries(&gateway).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn users_are_served_independently() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let gateway = Gateway::with_registry(config(dir.path()), transport.clone(), |r| {
        r.with_converter(Action::DocxToPdf, CopyConverter::new(Duration::from_millis(20)))
    });

    let handles: Vec<_> = (0..8)
        .map(|user: UserId| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                let body = format!("body of user {user}");
                gateway
                    .on_file_received(user, msg(), body.as_bytes(), "same-name.docx")
                    .await
                    .unwrap();
                gateway
                    .on_action_selected(user, msg(), "docx_to_pdf")
                    .await
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_delivered());
    }

    let delivered = transport.delivered();
    assert_eq!(delivered.len(), 8);
    for (user, artifact) in delivered {
        assert_eq!(artifact.filename, "same-name.pdf");
        assert_eq!(artifact.bytes, format!("body of user {user}").into_bytes());
    }
    assert!(gateway.sessions().is_empty());
    assert!(temp_entries(&gateway).is_empty());
}

// ── Maintenance ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_releases_the_staged_file() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Gateway::new(config(dir.path()), Arc::new(RecordingTransport::default()));
    gateway
        .on_file_received(1, msg(), &b"x"[..], "a.doc")
        .await
        .unwrap();

    assert!(gateway.cancel(1).await);
    assert!(!gateway.cancel(1).await);
    assert!(temp_entries(&gateway).is_empty());
}

#[tokio::test]
async fn sweep_evicts_expired_sessions_and_orphans() {
    let dir = tempfile::tempdir().unwrap();
    let config = GatewayConfig::builder()
        .temp_root(dir.path().join("tmp"))
        .session_ttl_secs(0)
        .process_timeout_secs(1)
        .orphan_max_age_secs(1)
        .build()
        .unwrap();
    let gateway = Gateway::new(config, Arc::new(RecordingTransport::default()));

    gateway
        .on_file_received(1, msg(), &b"x"[..], "a.pdf")
        .await
        .unwrap();
    std::fs::write(gateway.temp().root().join("stray.bin"), b"orphan").unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let report = gateway.sweep_once().await;
    assert_eq!(report.sessions_evicted, 1);
    assert_eq!(report.files_removed, 1, "only the stray file is left for the sweep");
    assert!(temp_entries(&gateway).is_empty());

    let err = gateway
        .on_action_selected(1, msg(), "pdf_to_docx")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NoActiveSession { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweep_leaves_a_running_job_alone() {
    let dir = tempfile::tempdir().unwrap();
    let config = GatewayConfig::builder()
        .temp_root(dir.path().join("tmp"))
        .session_ttl_secs(1)
        .process_timeout_secs(1)
        .orphan_max_age_secs(2)
        .build()
        .unwrap();
    let copy = CopyConverter::new(Duration::from_millis(800));
    let transport = Arc::new(RecordingTransport::default());
    let gateway = Gateway::with_registry(config, transport.clone(), |r| {
        r.with_converter(Action::DocxToPdf, copy.clone())
    });

    gateway
        .on_file_received(1, msg(), &b"old upload"[..], "memo.docx")
        .await
        .unwrap();
    // Old enough to count as an orphan once the job has taken the session.
    tokio::time::sleep(Duration::from_millis(2100)).await;

    let job = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.on_action_selected(1, msg(), "docx_to_pdf").await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!gateway.sessions().contains(1), "job holds the upload");
    assert!(gateway.temp().claimed() >= 1);

    let report = gateway.sweep_once().await;
    assert_eq!(report.files_removed, 0);

    let outcome = job.await.unwrap().unwrap();
    assert!(outcome.is_delivered(), "{outcome:?}");
    assert_eq!(transport.delivered()[0].1.bytes, b"old upload");
    assert_eq!(gateway.temp().claimed(), 0);
    assert!(temp_entries(&gateway).is_empty());
}

#[tokio::test]
async fn sweeper_task_can_be_aborted() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Gateway::new(config(dir.path()), Arc::new(RecordingTransport::default()));
    let handle = gateway.spawn_sweeper();
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());
}

// ── Office transcoding (fake LibreOffice) ────────────────────────────────────

#[cfg(unix)]
mod office {
    use super::*;
    use fileconv_gateway::converters::OfficeConverter;
    use fileconv_gateway::TempStore;
    use std::os::unix::fs::PermissionsExt;

    /// Mimics `soffice --convert-to`: writes `<outdir>/<stem>.<fmt>` with
    /// the input's bytes after a short delay.
    const FAKE_OFFICE: &str = r#"#!/bin/sh
fmt=""; outdir=""; input=""
while [ $# -gt 0 ]; do
  case "$1" in
    --convert-to) fmt="$2"; shift 2 ;;
    --outdir) outdir="$2"; shift 2 ;;
    -*) shift ;;
    *) input="$1"; shift ;;
  esac
done
sleep 0.2
name=$(basename "$input")
cat "$input" > "$outdir/${name%.*}.${fmt%%:*}"
"#;

    fn install_fake_office(dir: &Path) -> String {
        let path = dir.join("fake-soffice");
        std::fs::write(&path, FAKE_OFFICE).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn identically_named_inputs_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let office = install_fake_office(dir.path());
        let converter = Arc::new(OfficeConverter::new(
            office,
            "pdf",
            Duration::from_secs(20),
            TempStore::new(dir.path().join("tmp")),
        ));

        let mut jobs = Vec::new();
        for n in 0..2 {
            let src_dir = dir.path().join(format!("src{n}"));
            std::fs::create_dir_all(&src_dir).unwrap();
            let input = src_dir.join("report.docx");
            std::fs::write(&input, format!("contents {n}")).unwrap();
            let output = dir.path().join(format!("out{n}.pdf"));
            let converter = converter.clone();
            jobs.push(tokio::spawn(async move {
                let ok = converter.convert(&input, &output).await;
                (ok, output)
            }));
        }

        for (n, job) in jobs.into_iter().enumerate() {
            let (ok, output) = job.await.unwrap();
            assert!(ok);
            assert_eq!(std::fs::read_to_string(output).unwrap(), format!("contents {n}"));
        }
    }

    #[tokio::test]
    async fn word_to_pdf_through_the_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let office = install_fake_office(dir.path());
        let config = GatewayConfig::builder()
            .temp_root(dir.path().join("tmp"))
            .office_command(office)
            .build()
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let gateway = Gateway::new(config, transport.clone());

        gateway
            .on_file_received(1, msg(), &b"word body"[..], "Letter.DOCX")
            .await
            .unwrap();
        let outcome = gateway
            .on_action_selected(1, msg(), "docx_to_pdf")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            JobOutcome::Delivered {
                filename: "Letter.pdf".into(),
                size: 9
            }
        );
        assert_eq!(transport.delivered()[0].1.bytes, b"word body");
        assert!(temp_entries(&gateway).is_empty());
    }
}

// ── pdfium (gated) ───────────────────────────────────────────────────────────

/// Skip this test unless a pdfium library is available.
macro_rules! pdfium_skip_unless_ready {
    () => {{
        if std::env::var_os("PDFIUM_LIB_PATH").is_none() {
            println!("SKIP — set PDFIUM_LIB_PATH to run pdfium tests");
            return;
        }
    }};
}

/// A one-page PDF with a single line of Helvetica text.
fn text_pdf(text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

#[tokio::test]
async fn pdf_to_docx_delivers_report_docx() {
    pdfium_skip_unless_ready!();
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let gateway = Gateway::new(config(dir.path()), transport.clone());

    let pdf = text_pdf("Quarterly report");
    gateway
        .on_file_received(1, msg(), pdf.as_slice(), "report.pdf")
        .await
        .unwrap();
    let outcome = gateway
        .on_action_selected(1, msg(), "pdf_to_docx")
        .await
        .unwrap();

    assert!(matches!(outcome, JobOutcome::Delivered { ref filename, .. } if filename == "report.docx"));
    let (_, artifact) = transport.delivered().pop().unwrap();
    let document = zip_entry(&artifact.bytes, "word/document.xml");
    assert!(document.contains("Quarterly report"), "{document}");
    assert!(temp_entries(&gateway).is_empty());
}

#[tokio::test]
async fn pdf_to_image_renders_first_page() {
    pdfium_skip_unless_ready!();
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let gateway = Gateway::new(config(dir.path()), transport.clone());

    let pdf = text_pdf("Cover page");
    gateway
        .on_file_received(1, msg(), pdf.as_slice(), "deck.pdf")
        .await
        .unwrap();
    let outcome = gateway
        .on_action_selected(1, msg(), "pdf_to_image")
        .await
        .unwrap();

    assert!(outcome.is_delivered(), "{outcome:?}");
    let (_, artifact) = transport.delivered().pop().unwrap();
    assert_eq!(artifact.filename, "deck.png");
    let img = image::load_from_memory(&artifact.bytes).unwrap();
    assert_eq!(img.width(), 1600);
}
