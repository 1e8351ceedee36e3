//! Overlay font: provisioning, text encoding and embedding.
//!
//! A [`FontHandle`] is created once by [`FontProvisioner`] and shared read-only by
//! every page and every fill. It is either a TrueType program embedded as a Type0
//! (`Identity-H`) font, or the built-in Helvetica when the program could not be
//! obtained. The fallback only covers WinAnsi; other characters render as `?`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use pdf_writer::types::{SystemInfo, UnicodeCmap};
use pdf_writer::{Name, Str};
use ttf_parser::{Face, GlyphId, name_id};

use crate::config::FontSource;
use crate::error::{FillError, Result};

/// Upper bound for a downloaded font program
const MAX_FONT_BYTES: u64 = 32 * 1024 * 1024;

pub struct FontProvisioner {
    source: FontSource,
}

impl FontProvisioner {
    pub fn new(source: FontSource) -> Self {
        Self { source }
    }

    /// Make the font available locally and load it; fall back to Helvetica on any failure.
    pub fn provision(&self) -> FontHandle {
        match self.try_provision() {
            Ok(program) => {
                log::info!(
                    "overlay font {} ({} glyphs) from {}",
                    program.postscript_name,
                    program.num_glyphs,
                    self.source.cache_path.display()
                );
                FontHandle::Embedded(Arc::new(program))
            }
            Err(e) => {
                log::warn!("{e}; falling back to built-in Helvetica");
                FontHandle::fallback(e.to_string())
            }
        }
    }

    fn try_provision(&self) -> Result<TrueTypeProgram> {
        let path = &self.source.cache_path;
        if !path.exists() {
            if self.source.offline {
                return Err(FillError::FontUnavailable(format!(
                    "{} is not cached and fetching is disabled",
                    path.display()
                )));
            }
            self.fetch(path)?;
        }
        let data = fs::read(path).map_err(|e| {
            FillError::FontUnavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        TrueTypeProgram::parse(data)
    }

    /// Download the program, check it parses, then persist it atomically.
    fn fetch(&self, path: &Path) -> Result<()> {
        log::info!("fetching font {}", self.source.url);
        let unavailable = |e: &dyn fmt::Display| {
            FillError::FontUnavailable(format!("fetching {} failed: {e}", self.source.url))
        };
        let mut response = ureq::get(self.source.url.as_str())
            .call()
            .map_err(|e| unavailable(&e))?;
        let data = response
            .body_mut()
            .with_config()
            .limit(MAX_FONT_BYTES)
            .read_to_vec()
            .map_err(|e| unavailable(&e))?;
        TrueTypeProgram::parse(data.clone())?;

        let persist = || -> std::io::Result<()> {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let partial = path.with_extension("part");
            fs::write(&partial, &data)?;
            fs::rename(&partial, path)
        };
        persist().map_err(|e| {
            FillError::FontUnavailable(format!("cannot cache {}: {e}", path.display()))
        })?;
        log::debug!("cached {} bytes at {}", data.len(), path.display());
        Ok(())
    }
}

/// A validated TrueType program with the metrics its font descriptor needs.
pub struct TrueTypeProgram {
    data: Vec<u8>,
    postscript_name: String,
    num_glyphs: u16,
    units_per_em: u16,
    ascent: i16,
    descent: i16,
    cap_height: i16,
    bbox: [i16; 4],
}

impl fmt::Debug for TrueTypeProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrueTypeProgram")
            .field("postscript_name", &self.postscript_name)
            .field("bytes", &self.data.len())
            .field("num_glyphs", &self.num_glyphs)
            .finish()
    }
}

impl TrueTypeProgram {
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let face = Face::parse(&data, 0)
            .map_err(|e| FillError::FontUnavailable(format!("invalid font program: {e}")))?;
        if face.tables().cmap.is_none() {
            return Err(FillError::FontUnavailable(
                "font program has no cmap table".into(),
            ));
        }
        let postscript_name = face
            .names()
            .into_iter()
            .find(|n| n.name_id == name_id::POST_SCRIPT_NAME)
            .and_then(|n| n.to_string())
            .map(|n| {
                n.chars()
                    .filter(|c| c.is_ascii_graphic() && !"[](){}<>/%".contains(*c))
                    .collect::<String>()
            })
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "FormstampOverlay".to_string());
        let bbox = face.global_bounding_box();
        let num_glyphs = face.number_of_glyphs();
        let units_per_em = face.units_per_em();
        let ascent = face.ascender();
        let descent = face.descender();
        let cap_height = face.capital_height().unwrap_or(ascent);
        let bbox = [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max];
        Ok(Self {
            data,
            postscript_name,
            num_glyphs,
            units_per_em,
            ascent,
            descent,
            cap_height,
            bbox,
        })
    }

    pub fn postscript_name(&self) -> &str {
        &self.postscript_name
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, 0).ok()
    }

    fn scale(&self, v: i16) -> i64 {
        i64::from(v) * 1000 / i64::from(self.units_per_em.max(1))
    }
}

/// Read-only font handle shared by all pages of all fills.
#[derive(Debug, Clone)]
pub enum FontHandle {
    Embedded(Arc<TrueTypeProgram>),
    Fallback { reason: Arc<str> },
}

/// Text ready for a `Tj` operand, plus the glyphs it uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedText {
    pub bytes: Vec<u8>,
    pub glyphs: BTreeMap<u16, char>,
}

impl FontHandle {
    pub fn fallback(reason: impl Into<String>) -> Self {
        FontHandle::Fallback {
            reason: Arc::from(reason.into()),
        }
    }

    /// Built-in Helvetica, for callers that never want to embed a font.
    pub fn builtin() -> Self {
        Self::fallback("built-in font requested")
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FontHandle::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            FontHandle::Fallback { reason } => Some(reason.as_ref()),
            FontHandle::Embedded(_) => None,
        }
    }

    /// The fallback as a reportable (non-fatal) error.
    pub fn warning(&self) -> Option<FillError> {
        self.fallback_reason()
            .map(|r| FillError::FontUnavailable(r.to_string()))
    }

    pub fn encode(&self, text: &str) -> EncodedText {
        match self {
            FontHandle::Embedded(program) => {
                let Some(face) = program.face() else {
                    return EncodedText::default();
                };
                let mut out = EncodedText::default();
                for c in text.chars() {
                    let gid = face.glyph_index(c).map(|g| g.0).unwrap_or(0);
                    out.bytes.extend_from_slice(&gid.to_be_bytes());
                    if gid != 0 {
                        out.glyphs.insert(gid, c);
                    }
                }
                out
            }
            FontHandle::Fallback { .. } => EncodedText {
                bytes: text.chars().map(win_ansi_byte).collect(),
                glyphs: BTreeMap::new(),
            },
        }
    }

    /// Insert the font objects for this handle at the reserved id `font_id`.
    pub(crate) fn embed(
        &self,
        doc: &mut Document,
        font_id: ObjectId,
        used: &BTreeMap<u16, char>,
    ) -> Result<()> {
        match self {
            FontHandle::Fallback { .. } => {
                doc.objects.insert(
                    font_id,
                    Object::Dictionary(dictionary! {
                        "Type" => "Font",
                        "Subtype" => "Type1",
                        "BaseFont" => "Helvetica",
                        "Encoding" => "WinAnsiEncoding",
                    }),
                );
            }
            FontHandle::Embedded(program) => {
                embed_type0(doc, font_id, program, used)?;
            }
        }
        Ok(())
    }
}

fn embed_type0(
    doc: &mut Document,
    font_id: ObjectId,
    program: &TrueTypeProgram,
    used: &BTreeMap<u16, char>,
) -> Result<()> {
    let face = program
        .face()
        .ok_or_else(|| FillError::SerializationError("font program no longer parses".into()))?;
    let base_font = Object::Name(program.postscript_name.as_bytes().to_vec());

    let file_id = doc.add_object(Stream::new(
        dictionary! { "Length1" => program.data.len() as i64 },
        program.data.clone(),
    ));

    let [x_min, y_min, x_max, y_max] = program.bbox;
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => base_font.clone(),
        "Flags" => 32,
        "FontBBox" => vec![
            program.scale(x_min).into(),
            program.scale(y_min).into(),
            program.scale(x_max).into(),
            program.scale(y_max).into(),
        ],
        "ItalicAngle" => 0,
        "Ascent" => program.scale(program.ascent),
        "Descent" => program.scale(program.descent),
        "CapHeight" => program.scale(program.cap_height),
        "StemV" => 80,
        "FontFile2" => file_id,
    });

    // /W as [gid [width] gid [width] ...]
    let mut widths = Vec::with_capacity(used.len() * 2);
    for &gid in used.keys() {
        let advance = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0);
        widths.push(Object::Integer(i64::from(gid)));
        widths.push(Object::Array(vec![Object::Integer(
            i64::from(advance) * 1000 / i64::from(program.units_per_em.max(1)),
        )]));
    }

    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => base_font.clone(),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "CIDToGIDMap" => "Identity",
        "DW" => 1000,
        "W" => widths,
    });

    let to_unicode_id = doc.add_object(Stream::new(Dictionary::new(), to_unicode_cmap(used)));

    doc.objects.insert(
        font_id,
        Object::Dictionary(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => base_font,
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        }),
    );
    Ok(())
}

/// ToUnicode CMap mapping each used glyph id back to its character.
fn to_unicode_cmap(used: &BTreeMap<u16, char>) -> Vec<u8> {
    let info = SystemInfo {
        registry: Str(b"Adobe"),
        ordering: Str(b"UCS"),
        supplement: 0,
    };
    let mut cmap = UnicodeCmap::new(Name(b"Adobe-Identity-UCS"), info);
    for (&gid, &c) in used {
        cmap.pair(gid, c);
    }
    cmap.finish().to_vec()
}

/// WinAnsiEncoding byte for `c`, `?` when the encoding has no such character.
fn win_ansi_byte(c: char) -> u8 {
    match c {
        ' '..='~' => c as u8,
        '\u{A0}'..='\u{FF}' => c as u32 as u8,
        '€' => 0x80,
        '‚' => 0x82,
        '„' => 0x84,
        '…' => 0x85,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        'Š' => 0x8A,
        'š' => 0x9A,
        'Œ' => 0x8C,
        'œ' => 0x9C,
        'Ž' => 0x8E,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => b'?',
    }
}
