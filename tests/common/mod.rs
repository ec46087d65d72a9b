//! Shared fixtures: PDFs assembled in code and a synthetic TrueType program.
#![allow(dead_code)]

use std::fmt::Write as _;

/// Builds a PDF file from object bodies, computing real xref offsets.
///
/// The catalog must be object 1.
#[derive(Debug, Clone)]
pub struct PdfBuilder {
    version: String,
    objects: Vec<(u32, Vec<u8>)>,
    trailer_extra: String,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.7".to_string(),
            objects: Vec::new(),
            trailer_extra: String::new(),
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn object(mut self, id: u32, body: &str) -> Self {
        self.objects.retain(|(n, _)| *n != id);
        self.objects.push((id, body.as_bytes().to_vec()));
        self
    }

    pub fn stream(mut self, id: u32, dict_entries: &str, data: &[u8]) -> Self {
        let mut body = format!("<< {} /Length {} >>\nstream\n", dict_entries, data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.objects.retain(|(n, _)| *n != id);
        self.objects.push((id, body));
        self
    }

    /// Extra trailer entries, e.g. `/Info 9 0 R`.
    pub fn trailer(mut self, extra: &str) -> Self {
        self.trailer_extra = extra.to_string();
        self
    }

    fn body(&self) -> (Vec<u8>, Vec<(u32, usize)>) {
        let mut out = format!("%PDF-{}\n%\u{e2}\u{e3}\u{cf}\u{d3}\n", self.version).into_bytes();
        let mut offsets = Vec::new();
        let mut objects = self.objects.clone();
        objects.sort_by_key(|(id, _)| *id);
        for (id, body) in &objects {
            offsets.push((*id, out.len()));
            out.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }
        (out, offsets)
    }

    fn size(&self) -> u32 {
        self.objects.iter().map(|(id, _)| *id).max().unwrap_or(0) + 1
    }

    fn xref_table(&self, offsets: &[(u32, usize)], shift: isize) -> String {
        let mut table = format!("xref\n0 {}\n0000000000 65535 f \n", self.size());
        for id in 1..self.size() {
            match offsets.iter().find(|(n, _)| *n == id) {
                Some((_, offset)) => {
                    let offset = (*offset as isize + shift).max(0);
                    writeln!(table, "{:010} 00000 n ", offset).unwrap();
                },
                None => table.push_str("0000000000 65535 f \n"),
            }
        }
        table
    }

    fn trailer_dict(&self) -> String {
        format!("<< /Size {} /Root 1 0 R {} >>", self.size(), self.trailer_extra)
    }

    /// A well-formed file.
    pub fn build(&self) -> Vec<u8> {
        self.build_shifted(0)
    }

    /// A file whose xref offsets are all off by `shift` bytes.
    pub fn build_shifted(&self, shift: isize) -> Vec<u8> {
        let (mut out, offsets) = self.body();
        let xref_offset = out.len();
        out.extend_from_slice(self.xref_table(&offsets, shift).as_bytes());
        out.extend_from_slice(
            format!("trailer\n{}\nstartxref\n{}\n%%EOF\n", self.trailer_dict(), xref_offset).as_bytes(),
        );
        out
    }

    /// A file with objects and a trailer but no xref table or startxref.
    pub fn build_without_xref(&self) -> Vec<u8> {
        let (mut out, _) = self.body();
        out.extend_from_slice(format!("trailer\n{}\n%%EOF\n", self.trailer_dict()).as_bytes());
        out
    }
}

/// Catalog, a one-page tree and a content stream holding `content`.
pub fn minimal_builder(content: &str) -> PdfBuilder {
    PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << >> >>",
        )
        .stream(4, "", content.as_bytes())
}

pub fn minimal_pdf() -> Vec<u8> {
    minimal_builder("0.5 g 72 72 144 144 re f").build()
}

/// A one-page document drawing text with an unembedded TrueType font named `font`.
pub fn pdf_with_font(font: &str) -> Vec<u8> {
    PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
             /Resources << /Font << /F1 5 0 R >> >> >>",
        )
        .stream(4, "", b"BT /F1 12 Tf 72 720 Td (AB A) Tj ET")
        .object(
            5,
            &format!(
                "<< /Type /Font /Subtype /TrueType /BaseFont /{} /FirstChar 32 /LastChar 66 \
                 /Encoding /WinAnsiEncoding >>",
                font
            ),
        )
        .build()
}

fn be16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn be32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Advance widths of the synthetic font's glyphs: .notdef, space, A, B.
pub const SYNTHETIC_ADVANCES: [u16; 4] = [500, 250, 600, 650];

/// A minimal but valid TrueType program mapping space, `A` and `B`.
///
/// All glyphs are empty outlines; metrics use 1000 units per em.
pub fn synthetic_ttf(name: &str) -> Vec<u8> {
    let num_glyphs = SYNTHETIC_ADVANCES.len() as u16;

    let mut cmap = Vec::new();
    be16(&mut cmap, 0);
    be16(&mut cmap, 1);
    be16(&mut cmap, 3);
    be16(&mut cmap, 1);
    be32(&mut cmap, 12);
    let segments: [(u16, u16, u16); 3] = [(0x20, 0x20, 1), (0x41, 0x42, 2), (0xFFFF, 0xFFFF, 0)];
    let seg_count = segments.len() as u16;
    be16(&mut cmap, 4);
    be16(&mut cmap, 16 + 8 * seg_count);
    be16(&mut cmap, 0);
    be16(&mut cmap, seg_count * 2);
    be16(&mut cmap, 4);
    be16(&mut cmap, 1);
    be16(&mut cmap, seg_count * 2 - 4);
    for (_, end, _) in segments {
        be16(&mut cmap, end);
    }
    be16(&mut cmap, 0);
    for (start, _, _) in segments {
        be16(&mut cmap, start);
    }
    for (start, _, glyph) in segments {
        let delta = if start == 0xFFFF { 1 } else { glyph.wrapping_sub(start) };
        be16(&mut cmap, delta);
    }
    for _ in segments {
        be16(&mut cmap, 0);
    }

    let glyf = vec![0u8; 4];

    let mut head = Vec::new();
    be16(&mut head, 1);
    be16(&mut head, 0);
    be32(&mut head, 0x0001_0000);
    be32(&mut head, 0);
    be32(&mut head, 0x5F0F_3CF5);
    be16(&mut head, 0);
    be16(&mut head, 1000);
    head.extend_from_slice(&[0u8; 16]);
    for v in [0i16, -200, 600, 800] {
        be16(&mut head, v as u16);
    }
    be16(&mut head, 0);
    be16(&mut head, 8);
    be16(&mut head, 2);
    be16(&mut head, 0);
    be16(&mut head, 0);

    let mut hhea = Vec::new();
    be32(&mut hhea, 0x0001_0000);
    be16(&mut hhea, 800);
    be16(&mut hhea, (-200i16) as u16);
    be16(&mut hhea, 0);
    be16(&mut hhea, 650);
    be16(&mut hhea, 0);
    be16(&mut hhea, 0);
    be16(&mut hhea, 600);
    be16(&mut hhea, 1);
    be16(&mut hhea, 0);
    be16(&mut hhea, 0);
    hhea.extend_from_slice(&[0u8; 8]);
    be16(&mut hhea, 0);
    be16(&mut hhea, num_glyphs);

    let mut hmtx = Vec::new();
    for advance in SYNTHETIC_ADVANCES {
        be16(&mut hmtx, advance);
        be16(&mut hmtx, 0);
    }

    let loca = vec![0u8; (num_glyphs as usize + 1) * 2];

    let mut maxp = Vec::new();
    be32(&mut maxp, 0x0000_5000);
    be16(&mut maxp, num_glyphs);

    let utf16: Vec<u8> = name.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
    let name_ids = [1u16, 4, 6];
    let mut name_table = Vec::new();
    be16(&mut name_table, 0);
    be16(&mut name_table, name_ids.len() as u16);
    be16(&mut name_table, 6 + 12 * name_ids.len() as u16);
    for id in name_ids {
        be16(&mut name_table, 3);
        be16(&mut name_table, 1);
        be16(&mut name_table, 0x409);
        be16(&mut name_table, id);
        be16(&mut name_table, utf16.len() as u16);
        be16(&mut name_table, 0);
    }
    name_table.extend_from_slice(&utf16);

    let mut post = Vec::new();
    be32(&mut post, 0x0003_0000);
    be32(&mut post, 0);
    be16(&mut post, (-100i16) as u16);
    be16(&mut post, 50);
    post.extend_from_slice(&[0u8; 20]);

    // Table directory must be sorted by tag.
    let tables: [(&[u8; 4], Vec<u8>); 9] = [
        (b"cmap", cmap),
        (b"glyf", glyf),
        (b"head", head),
        (b"hhea", hhea),
        (b"hmtx", hmtx),
        (b"loca", loca),
        (b"maxp", maxp),
        (b"name", name_table),
        (b"post", post),
    ];

    let mut out = Vec::new();
    be32(&mut out, 0x0001_0000);
    be16(&mut out, tables.len() as u16);
    be16(&mut out, 128);
    be16(&mut out, 3);
    be16(&mut out, tables.len() as u16 * 16 - 128);

    let mut offset = 12 + 16 * tables.len();
    let mut data = Vec::new();
    for (tag, table) in &tables {
        out.extend_from_slice(*tag);
        be32(&mut out, 0);
        be32(&mut out, offset as u32);
        be32(&mut out, table.len() as u32);
        data.extend_from_slice(table);
        while data.len() % 4 != 0 {
            data.push(0);
        }
        offset = 12 + 16 * tables.len() + data.len();
    }
    out.extend_from_slice(&data);
    out
}
