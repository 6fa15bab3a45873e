//! Image → PDF.

use std::path::Path;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::ImageReader;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::debug;

use super::{contain, run_blocking, Converter};
use crate::error::ConverterError;

/// Resolution the page is sized for.
const PAGE_DPI: f32 = 100.0;
const JPEG_QUALITY: u8 = 90;

/// Writes a single-page PDF sized to the image at 100 DPI.
///
/// The picture is re-encoded as an RGB JPEG; any alpha channel is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageToPdf;

fn image_to_pdf_blocking(input: &Path, output: &Path) -> Result<(), ConverterError> {
    let rgb = ImageReader::open(input)?
        .with_guessed_format()?
        .decode()?
        .to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&rgb)?;

    let width_pt = width as f32 * 72.0 / PAGE_DPI;
    let height_pt = height as f32 * 72.0 / PAGE_DPI;
    debug!(width, height, width_pt, height_pt, "Embedding image in PDF page");

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width_pt.into(),
                    0.into(),
                    0.into(),
                    height_pt.into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), width_pt.into(), height_pt.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(output)?;
    Ok(())
}

#[async_trait]
impl Converter for ImageToPdf {
    fn name(&self) -> &'static str {
        "image_to_pdf"
    }

    async fn convert(&self, input: &Path, output: &Path) -> bool {
        let (src, dst) = (input.to_path_buf(), output.to_path_buf());
        let result = run_blocking(move || image_to_pdf_blocking(&src, &dst)).await;
        contain(self.name(), input, result)
    }
}
