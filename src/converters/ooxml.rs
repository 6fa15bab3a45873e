//! Minimal Office Open XML writers for the OCR adapters.
//!
//! Only what the adapters need: a DOCX of plain paragraphs, page breaks and
//! inline pictures, and a single-sheet XLSX of inline-string cells with an
//! optional picture anchored to a cell. Both are zip packages of
//! hand-assembled parts.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::{ImageFormat, ImageReader};
use quick_xml::escape::escape;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::ConverterError;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_DRAWING: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// English Metric Units per inch.
const EMU_PER_INCH: u64 = 914_400;
/// EMUs per pixel at 96 DPI, the spreadsheet default.
const EMU_PER_PX: u64 = 9_525;

/// A PNG or JPEG picture ready to be stored in a package.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub bytes: Vec<u8>,
    /// `png` or `jpeg`
    pub extension: &'static str,
    pub width_px: u32,
    pub height_px: u32,
}

impl EmbeddedImage {
    /// Load a picture from disk, re-encoding to PNG anything that is not
    /// already PNG or JPEG.
    pub fn from_path(path: &Path) -> Result<Self, ConverterError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        match reader.format() {
            Some(ImageFormat::Png) | Some(ImageFormat::Jpeg) => {
                let extension = if reader.format() == Some(ImageFormat::Png) {
                    "png"
                } else {
                    "jpeg"
                };
                let (width_px, height_px) = reader.into_dimensions()?;
                Ok(Self {
                    bytes: std::fs::read(path)?,
                    extension,
                    width_px,
                    height_px,
                })
            }
            _ => {
                let img = reader.decode()?;
                let mut bytes = Vec::new();
                img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)?;
                Ok(Self {
                    bytes,
                    extension: "png",
                    width_px: img.width(),
                    height_px: img.height(),
                })
            }
        }
    }

    /// Extent in EMUs when scaled to `width_emu`, keeping the aspect ratio.
    fn scaled_extent(&self, width_emu: u64) -> (u64, u64) {
        let w = u64::from(self.width_px.max(1));
        let h = u64::from(self.height_px.max(1));
        (width_emu, width_emu * h / w)
    }
}

/// Body content of a [`DocxBuilder`].
#[derive(Debug, Clone)]
enum Block {
    Paragraph(String),
    PageBreak,
    Picture {
        image: EmbeddedImage,
        width_inches: f64,
    },
}

/// Builds a `.docx` document.
#[derive(Debug, Default)]
pub struct DocxBuilder {
    blocks: Vec<Block>,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paragraph(&mut self, text: impl Into<String>) -> &mut Self {
        self.blocks.push(Block::Paragraph(text.into()));
        self
    }

    pub fn page_break(&mut self) -> &mut Self {
        self.blocks.push(Block::PageBreak);
        self
    }

    pub fn picture(&mut self, image: EmbeddedImage, width_inches: f64) -> &mut Self {
        self.blocks.push(Block::Picture {
            image,
            width_inches,
        });
        self
    }

    /// Serialise the package to `path`.
    pub fn write(&self, path: &Path) -> Result<(), ConverterError> {
        let mut pkg = Package::create(path)?;
        let mut body = String::new();
        let mut rels = String::new();
        let mut media_exts: Vec<&'static str> = Vec::new();
        let mut picture_no = 0u32;

        for block in &self.blocks {
            match block {
                Block::Paragraph(text) => {
                    let _ = write!(
                        body,
                        r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
                        xml_text(text)
                    );
                }
                Block::PageBreak => body.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#),
                Block::Picture {
                    image,
                    width_inches,
                } => {
                    picture_no += 1;
                    let rel_id = format!("rIdImg{picture_no}");
                    let media = format!("image{picture_no}.{}", image.extension);
                    pkg.add(&format!("word/media/{media}"), &image.bytes)?;
                    if !media_exts.contains(&image.extension) {
                        media_exts.push(image.extension);
                    }
                    let _ = write!(
                        rels,
                        r#"<Relationship Id="{rel_id}" Type="{REL_IMAGE}" Target="media/{media}"/>"#
                    );
                    let (cx, cy) =
                        image.scaled_extent((width_inches * EMU_PER_INCH as f64) as u64);
                    let _ = write!(
                        body,
                        concat!(
                            r#"<w:p><w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
                            r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{n}" name="Picture {n}"/>"#,
                            r#"<a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                            r#"<pic:pic><pic:nvPicPr><pic:cNvPr id="{n}" name="{media}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
                            r#"<pic:blipFill><a:blip r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
                            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
                            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic>"#,
                            r#"</a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
                        ),
                        cx = cx,
                        cy = cy,
                        n = picture_no,
                        media = media,
                        rel = rel_id,
                    );
                }
            }
        }

        pkg.add(
            "[Content_Types].xml",
            content_types(
                &media_exts,
                &[(
                    "/word/document.xml",
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
                )],
            )
            .as_bytes(),
        )?;
        pkg.add("_rels/.rels", root_rels("word/document.xml").as_bytes())?;
        pkg.add(
            "word/_rels/document.xml.rels",
            format!(r#"{XML_HEADER}<Relationships xmlns="{NS_PKG_REL}">{rels}</Relationships>"#)
                .as_bytes(),
        )?;
        pkg.add(
            "word/document.xml",
            format!(
                concat!(
                    "{header}",
                    r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
                    r#"xmlns:r="{ns_rel}" "#,
                    r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
                    r#"xmlns:a="{ns_a}" "#,
                    r#"xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                    "<w:body>{body}",
                    r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/>"#,
                    r#"<w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/>"#,
                    "</w:sectPr></w:body></w:document>"
                ),
                header = XML_HEADER,
                ns_rel = NS_REL,
                ns_a = NS_DRAWING,
                body = body,
            )
            .as_bytes(),
        )?;
        pkg.finish()
    }
}

/// Builds a single-sheet `.xlsx` workbook.
#[derive(Debug, Default)]
pub struct XlsxBuilder {
    rows: Vec<Vec<String>>,
    picture: Option<(usize, EmbeddedImage)>,
}

impl XlsxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row; empty cells are left blank.
    pub fn row<I, S>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Anchor `image` at column A of the 0-indexed `row`.
    pub fn picture_at(&mut self, row: usize, image: EmbeddedImage) -> &mut Self {
        self.picture = Some((row, image));
        self
    }

    /// Serialise the package to `path`.
    pub fn write(&self, path: &Path) -> Result<(), ConverterError> {
        let mut pkg = Package::create(path)?;
        let mut sheet_data = String::new();

        for (r, cells) in self.rows.iter().enumerate() {
            let row_no = r + 1;
            let _ = write!(sheet_data, r#"<row r="{row_no}">"#);
            for (c, value) in cells.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let _ = write!(
                    sheet_data,
                    r#"<c r="{}{row_no}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                    column_name(c),
                    xml_text(value)
                );
            }
            sheet_data.push_str("</row>");
        }

        let mut overrides = vec![
            (
                "/xl/workbook.xml",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
            ),
            (
                "/xl/worksheets/sheet1.xml",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
            ),
            (
                "/xl/styles.xml",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml",
            ),
        ];
        let mut media_exts = Vec::new();
        let mut drawing_ref = String::new();

        if let Some((row, image)) = &self.picture {
            let media = format!("image1.{}", image.extension);
            media_exts.push(image.extension);
            overrides.push((
                "/xl/drawings/drawing1.xml",
                "application/vnd.openxmlformats-officedocument.drawing+xml",
            ));
            drawing_ref.push_str(r#"<drawing r:id="rId1"/>"#);

            let cx = u64::from(image.width_px) * EMU_PER_PX;
            let cy = u64::from(image.height_px) * EMU_PER_PX;
            pkg.add(&format!("xl/media/{media}"), &image.bytes)?;
            pkg.add(
                "xl/worksheets/_rels/sheet1.xml.rels",
                format!(
                    r#"{XML_HEADER}<Relationships xmlns="{NS_PKG_REL}"><Relationship Id="rId1" Type="{NS_REL}/drawing" Target="../drawings/drawing1.xml"/></Relationships>"#
                )
                .as_bytes(),
            )?;
            pkg.add(
                "xl/drawings/_rels/drawing1.xml.rels",
                format!(
                    r#"{XML_HEADER}<Relationships xmlns="{NS_PKG_REL}"><Relationship Id="rId1" Type="{REL_IMAGE}" Target="../media/{media}"/></Relationships>"#
                )
                .as_bytes(),
            )?;
            pkg.add(
                "xl/drawings/drawing1.xml",
                format!(
                    concat!(
                        "{header}",
                        r#"<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:a="{ns_a}" xmlns:r="{ns_rel}">"#,
                        r#"<xdr:oneCellAnchor><xdr:from><xdr:col>0</xdr:col><xdr:colOff>0</xdr:colOff>"#,
                        r#"<xdr:row>{row}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from><xdr:ext cx="{cx}" cy="{cy}"/>"#,
                        r#"<xdr:pic><xdr:nvPicPr><xdr:cNvPr id="2" name="Picture 1"/><xdr:cNvPicPr><a:picLocks noChangeAspect="1"/></xdr:cNvPicPr></xdr:nvPicPr>"#,
                        r#"<xdr:blipFill><a:blip r:embed="rId1"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill>"#,
                        r#"<xdr:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></xdr:spPr>"#,
                        r#"</xdr:pic><xdr:clientData/></xdr:oneCellAnchor></xdr:wsDr>"#
                    ),
                    header = XML_HEADER,
                    ns_a = NS_DRAWING,
                    ns_rel = NS_REL,
                    row = row,
                    cx = cx,
                    cy = cy,
                )
                .as_bytes(),
            )?;
        }

        pkg.add(
            "[Content_Types].xml",
            content_types(&media_exts, &overrides).as_bytes(),
        )?;
        pkg.add("_rels/.rels", root_rels("xl/workbook.xml").as_bytes())?;
        pkg.add(
            "xl/workbook.xml",
            format!(
                r#"{XML_HEADER}<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="{NS_REL}"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#
            )
            .as_bytes(),
        )?;
        pkg.add(
            "xl/_rels/workbook.xml.rels",
            format!(
                concat!(
                    "{header}",
                    r#"<Relationships xmlns="{ns_pkg}">"#,
                    r#"<Relationship Id="rId1" Type="{ns_rel}/worksheet" Target="worksheets/sheet1.xml"/>"#,
                    r#"<Relationship Id="rId2" Type="{ns_rel}/styles" Target="styles.xml"/>"#,
                    "</Relationships>"
                ),
                header = XML_HEADER,
                ns_pkg = NS_PKG_REL,
                ns_rel = NS_REL,
            )
            .as_bytes(),
        )?;
        pkg.add("xl/styles.xml", STYLES_XML.as_bytes())?;
        pkg.add(
            "xl/worksheets/sheet1.xml",
            format!(
                r#"{XML_HEADER}<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="{NS_REL}"><sheetData>{sheet_data}</sheetData>{drawing_ref}</worksheet>"#
            )
            .as_bytes(),
        )?;
        pkg.finish()
    }
}

const STYLES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>"#,
    r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
    r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
    r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    r#"<cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>"#,
    r#"</styleSheet>"#
);

/// Zip container with deflated entries.
struct Package {
    writer: ZipWriter<BufWriter<File>>,
}

impl Package {
    fn create(path: &Path) -> Result<Self, ConverterError> {
        let file = File::create(path)?;
        Ok(Self {
            writer: ZipWriter::new(BufWriter::new(file)),
        })
    }

    fn add(&mut self, name: &str, content: &[u8]) -> Result<(), ConverterError> {
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        self.writer.start_file(name, options)?;
        self.writer.write_all(content)?;
        Ok(())
    }

    fn finish(self) -> Result<(), ConverterError> {
        let mut inner = self.writer.finish()?;
        inner.flush()?;
        Ok(())
    }
}

fn content_types(media_exts: &[&str], overrides: &[(&str, &str)]) -> String {
    let mut xml = format!(
        concat!(
            "{}",
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
            r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
            r#"<Default Extension="xml" ContentType="application/xml"/>"#
        ),
        XML_HEADER
    );
    for ext in media_exts {
        let _ = write!(xml, r#"<Default Extension="{ext}" ContentType="image/{ext}"/>"#);
    }
    for (part, content_type) in overrides {
        let _ = write!(
            xml,
            r#"<Override PartName="{part}" ContentType="{content_type}"/>"#
        );
    }
    xml.push_str("</Types>");
    xml
}

fn root_rels(main_part: &str) -> String {
    format!(
        r#"{XML_HEADER}<Relationships xmlns="{NS_PKG_REL}"><Relationship Id="rId1" Type="{NS_REL}/officeDocument" Target="{main_part}"/></Relationships>"#
    )
}

/// Escape `text` for element content, dropping characters XML 1.0 forbids
/// (OCR output ends pages with a form feed).
fn xml_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || c >= ' ')
        .collect();
    escape(cleaned.as_str()).into_owned()
}

/// Spreadsheet column letters for a 0-indexed column.
pub fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8(name).unwrap_or_default()
}
