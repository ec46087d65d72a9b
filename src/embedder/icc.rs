//! ICC colour profiles and PDF/A output intents.
//!
//! The engine carries no profile files. Two ICC v2 profiles are generated in code:
//!
//! - an sRGB display profile (`mntr`, matrix/TRC, D50-adapted colorants)
//! - a CMYK output profile (`prtr`, Lab PCS, lut16 `A2B0`/`B2A0`/`gamt`) computed from
//!   a naive subtractive model
//!
//! Either one can be wrapped in an `/ICCBased` stream and referenced from the
//! document's `/OutputIntents` with subtype `/GTS_PDFA1` (ISO 19005-1, 6.2.2).

use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

const HEADER_SIZE: usize = 128;
const TAG_ENTRY_SIZE: usize = 12;

/// D50 white point used by the profile connection space.
const D50: [f64; 3] = [0.9642, 1.0, 0.8249];

/// sRGB primaries chromatically adapted to D50 (columns are R, G, B).
const SRGB_TO_XYZ: [[f64; 3]; 3] = [
    [0.4360747, 0.3850649, 0.1430804],
    [0.2225045, 0.7168786, 0.0606169],
    [0.0139322, 0.0971045, 0.7141733],
];

const XYZ_TO_SRGB: [[f64; 3]; 3] = [
    [3.1338561, -1.6168667, -0.4906146],
    [-0.9787684, 1.9161415, 0.0334540],
    [0.0719453, -0.2289914, 1.4052427],
];

const TRC_POINTS: usize = 1024;
const A2B_GRID: usize = 5;
const B2A_GRID: usize = 9;

/// Colour model of a profile's data colour space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorModel {
    /// One channel.
    Gray,
    /// Three channels, additive.
    Rgb,
    /// Four channels, subtractive.
    Cmyk,
}

impl ColorModel {
    /// Number of colour components (`/N` of the ICCBased stream).
    pub fn components(&self) -> i64 {
        match self {
            ColorModel::Gray => 1,
            ColorModel::Rgb => 3,
            ColorModel::Cmyk => 4,
        }
    }

    /// The device colour space this model calibrates.
    pub fn device_space(&self) -> &'static str {
        match self {
            ColorModel::Gray => "DeviceGray",
            ColorModel::Rgb => "DeviceRGB",
            ColorModel::Cmyk => "DeviceCMYK",
        }
    }

    /// Colour model of a device colour space name.
    pub fn from_device_space(name: &str) -> Option<Self> {
        match name {
            "DeviceGray" | "G" => Some(ColorModel::Gray),
            "DeviceRGB" | "RGB" => Some(ColorModel::Rgb),
            "DeviceCMYK" | "CMYK" => Some(ColorModel::Cmyk),
            _ => None,
        }
    }
}

/// Header fields and tag signatures of a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IccProfileInfo {
    /// Declared profile size.
    pub size: u32,
    /// Major version.
    pub major_version: u8,
    /// Device class (`mntr`, `prtr`, ...).
    pub class: [u8; 4],
    /// Colour model of the data colour space.
    pub color_model: ColorModel,
    /// Profile connection space (`XYZ ` or `Lab `).
    pub pcs: [u8; 4],
    /// Tag signatures in table order.
    pub tags: Vec<[u8; 4]>,
}

impl IccProfileInfo {
    /// True when the profile carries the given tag.
    pub fn has_tag(&self, sig: &[u8; 4]) -> bool {
        self.tags.iter().any(|t| t == sig)
    }
}

/// Read and sanity-check a profile header and tag table.
///
/// Fails with [`Error::InvalidArgument`] when the data is not a usable ICC profile:
/// truncated, wrong signature, size mismatch, tags outside the data, or a colour
/// space other than gray, RGB or CMYK.
pub fn inspect(data: &[u8]) -> Result<IccProfileInfo> {
    let bad = |reason: &str| Error::InvalidArgument(format!("invalid ICC profile: {}", reason));
    if data.len() < HEADER_SIZE + 4 {
        return Err(bad("truncated header"));
    }
    if &data[36..40] != b"acsp" {
        return Err(bad("missing acsp signature"));
    }
    let size = BigEndian::read_u32(&data[0..4]);
    if size as usize != data.len() {
        return Err(bad("declared size does not match data"));
    }
    let color_model = match &data[16..20] {
        b"GRAY" => ColorModel::Gray,
        b"RGB " => ColorModel::Rgb,
        b"CMYK" => ColorModel::Cmyk,
        _ => return Err(bad("unsupported colour space")),
    };

    let count = BigEndian::read_u32(&data[HEADER_SIZE..HEADER_SIZE + 4]) as usize;
    let table_end = HEADER_SIZE + 4 + count * TAG_ENTRY_SIZE;
    if table_end > data.len() {
        return Err(bad("tag table exceeds profile"));
    }
    let mut tags = Vec::with_capacity(count);
    for i in 0..count {
        let entry = &data[HEADER_SIZE + 4 + i * TAG_ENTRY_SIZE..][..TAG_ENTRY_SIZE];
        let offset = BigEndian::read_u32(&entry[4..8]) as usize;
        let len = BigEndian::read_u32(&entry[8..12]) as usize;
        if offset < table_end || offset.saturating_add(len) > data.len() {
            return Err(bad("tag data outside profile"));
        }
        let mut sig = [0u8; 4];
        sig.copy_from_slice(&entry[0..4]);
        tags.push(sig);
    }

    let mut class = [0u8; 4];
    class.copy_from_slice(&data[12..16]);
    let mut pcs = [0u8; 4];
    pcs.copy_from_slice(&data[20..24]);
    Ok(IccProfileInfo {
        size,
        major_version: data[8],
        class,
        color_model,
        pcs,
        tags,
    })
}

/// Generate the sRGB IEC61966-2.1 display profile.
pub fn srgb_profile() -> Result<Vec<u8>> {
    let trc = curve_tag(&srgb_trc())?;
    let tags = vec![
        (*b"desc", text_description_tag("sRGB IEC61966-2.1")?),
        (*b"cprt", text_tag("No copyright, use freely")?),
        (*b"wtpt", xyz_tag(D50)?),
        (*b"rXYZ", xyz_tag(column(&SRGB_TO_XYZ, 0))?),
        (*b"gXYZ", xyz_tag(column(&SRGB_TO_XYZ, 1))?),
        (*b"bXYZ", xyz_tag(column(&SRGB_TO_XYZ, 2))?),
        (*b"rTRC", trc.clone()),
        (*b"gTRC", trc.clone()),
        (*b"bTRC", trc),
    ];
    assemble(b"mntr", b"RGB ", b"XYZ ", &tags)
}

/// Generate the CMYK output profile.
pub fn cmyk_profile() -> Result<Vec<u8>> {
    let a2b = lut16_tag(4, 3, A2B_GRID, |input| lab_to_pcs16(cmyk_to_lab(input)))?;
    let b2a = lut16_tag(3, 4, B2A_GRID, |input| {
        let lab = pcs16_to_lab(input);
        lab_to_cmyk(lab).iter().map(|v| unit_to_u16(*v)).collect()
    })?;
    let gamut = lut16_tag(3, 1, 2, |_| vec![0])?;
    let tags = vec![
        (*b"desc", text_description_tag("Generic CMYK (naive subtractive)")?),
        (*b"cprt", text_tag("No copyright, use freely")?),
        (*b"wtpt", xyz_tag(D50)?),
        (*b"A2B0", a2b),
        (*b"B2A0", b2a),
        (*b"gamt", gamut),
    ];
    assemble(b"prtr", b"CMYK", b"Lab ", &tags)
}

/// Wrap a profile in an `/ICCBased` stream dictionary.
pub fn icc_stream(profile: &[u8], model: ColorModel) -> Object {
    let mut dict = crate::object::Dict::new();
    dict.insert("N".to_string(), Object::Integer(model.components()));
    dict.insert("Alternate".to_string(), Object::name(model.device_space()));
    Object::stream(dict, profile.to_vec())
}

/// Build an `/OutputIntent` dictionary referencing a profile stream.
pub fn output_intent(profile: ObjectRef, identifier: &str) -> Object {
    Object::dictionary(vec![
        ("Type", Object::name("OutputIntent")),
        ("S", Object::name("GTS_PDFA1")),
        ("OutputConditionIdentifier", Object::text(identifier)),
        ("Info", Object::text(identifier)),
        ("RegistryName", Object::text("http://www.color.org")),
        ("DestOutputProfile", Object::Reference(profile)),
    ])
}

/// An output intent installed in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstalledIntent {
    /// The `/ICCBased` profile stream.
    pub profile: ObjectRef,
    /// Colour model of the profile.
    pub model: ColorModel,
}

/// Find an existing `GTS_PDFA1` output intent with a usable destination profile.
pub fn find_output_intent(doc: &Document) -> Option<InstalledIntent> {
    let catalog = doc.catalog()?;
    let intents = doc.lookup(catalog, "OutputIntents")?.as_array()?;
    intents.iter().find_map(|intent| {
        let intent = doc.resolve_dict(intent)?;
        if intent.get("S").and_then(|s| s.as_name()) != Some("GTS_PDFA1") {
            return None;
        }
        let profile = intent.get("DestOutputProfile")?.as_reference()?;
        let stream = doc.get(profile).filter(|s| s.is_stream())?;
        let info = inspect(&stream.decode_stream_data().ok()?).ok()?;
        Some(InstalledIntent {
            profile,
            model: info.color_model,
        })
    })
}

/// Install an output intent for `profile` and return it.
///
/// The profile stream and intent dictionary are inserted as new objects and the
/// intent replaces the catalog's `/OutputIntents` array, which PDF/A requires to hold
/// at most one destination profile.
pub fn install_output_intent(doc: &mut Document, profile: &[u8]) -> Result<InstalledIntent> {
    let info = inspect(profile)?;
    let identifier = match info.color_model {
        ColorModel::Rgb => "sRGB IEC61966-2.1",
        ColorModel::Cmyk => "Generic CMYK",
        ColorModel::Gray => "Generic Gray",
    };
    let profile_ref = doc.insert(icc_stream(profile, info.color_model));
    let intent_ref = doc.insert(output_intent(profile_ref, identifier));
    let catalog = doc
        .catalog_mut()
        .ok_or_else(|| Error::UnrecoverableDocument("catalog is missing".to_string()))?;
    catalog.insert(
        "OutputIntents".to_string(),
        Object::Array(vec![Object::Reference(intent_ref)]),
    );
    log::info!("Installed {} output intent {}", identifier, intent_ref);
    Ok(InstalledIntent {
        profile: profile_ref,
        model: info.color_model,
    })
}

fn assemble(class: &[u8; 4], space: &[u8; 4], pcs: &[u8; 4], tags: &[([u8; 4], Vec<u8>)]) -> Result<Vec<u8>> {
    let table_len = 4 + tags.len() * TAG_ENTRY_SIZE;
    let mut table = Vec::with_capacity(table_len);
    let mut body: Vec<u8> = Vec::new();
    let mut placed: Vec<(Vec<u8>, u32)> = Vec::new();

    table.write_u32::<BigEndian>(tags.len() as u32)?;
    for (sig, data) in tags {
        // Identical tag data (the three TRCs) is stored once.
        let offset = match placed.iter().find(|(d, _)| d == data) {
            Some((_, offset)) => *offset,
            None => {
                let offset = (HEADER_SIZE + table_len + body.len()) as u32;
                body.extend_from_slice(data);
                while body.len() % 4 != 0 {
                    body.push(0);
                }
                placed.push((data.clone(), offset));
                offset
            },
        };
        table.extend_from_slice(sig);
        table.write_u32::<BigEndian>(offset)?;
        table.write_u32::<BigEndian>(data.len() as u32)?;
    }

    let size = HEADER_SIZE + table.len() + body.len();
    let mut out = Vec::with_capacity(size);
    out.write_u32::<BigEndian>(size as u32)?;
    out.extend_from_slice(&[0; 4]); // preferred CMM
    out.write_u32::<BigEndian>(0x0210_0000)?;
    out.extend_from_slice(class);
    out.extend_from_slice(space);
    out.extend_from_slice(pcs);
    for field in [2024u16, 1, 1, 0, 0, 0] {
        out.write_u16::<BigEndian>(field)?;
    }
    out.extend_from_slice(b"acsp");
    out.extend_from_slice(&[0; 4]); // platform
    out.write_u32::<BigEndian>(0)?; // flags
    out.extend_from_slice(&[0; 8]); // manufacturer, model
    out.write_u64::<BigEndian>(0)?; // attributes
    out.write_u32::<BigEndian>(0)?; // perceptual intent
    for v in D50 {
        out.write_i32::<BigEndian>(s15_fixed16(v))?;
    }
    out.extend_from_slice(&[0; 4]); // creator
    out.resize(HEADER_SIZE, 0);
    out.extend_from_slice(&table);
    out.extend_from_slice(&body);
    Ok(out)
}

fn text_description_tag(text: &str) -> Result<Vec<u8>> {
    let mut tag = b"desc".to_vec();
    tag.extend_from_slice(&[0; 4]);
    tag.write_u32::<BigEndian>(text.len() as u32 + 1)?;
    tag.extend_from_slice(text.as_bytes());
    tag.push(0);
    tag.write_u32::<BigEndian>(0)?; // unicode language
    tag.write_u32::<BigEndian>(0)?; // unicode count
    tag.write_u16::<BigEndian>(0)?; // scriptcode code
    tag.push(0); // scriptcode count
    tag.extend_from_slice(&[0; 67]);
    Ok(tag)
}

fn text_tag(text: &str) -> Result<Vec<u8>> {
    let mut tag = b"text".to_vec();
    tag.extend_from_slice(&[0; 4]);
    tag.extend_from_slice(text.as_bytes());
    tag.push(0);
    Ok(tag)
}

fn xyz_tag(xyz: [f64; 3]) -> Result<Vec<u8>> {
    let mut tag = b"XYZ ".to_vec();
    tag.extend_from_slice(&[0; 4]);
    for v in xyz {
        tag.write_i32::<BigEndian>(s15_fixed16(v))?;
    }
    Ok(tag)
}

fn curve_tag(points: &[u16]) -> Result<Vec<u8>> {
    let mut tag = b"curv".to_vec();
    tag.extend_from_slice(&[0; 4]);
    tag.write_u32::<BigEndian>(points.len() as u32)?;
    for p in points {
        tag.write_u16::<BigEndian>(*p)?;
    }
    Ok(tag)
}

/// Build an `mft2` tag whose CLUT is sampled from `f` at every grid point.
///
/// `f` receives the normalized input coordinates and returns `outputs` encoded values.
fn lut16_tag<F>(inputs: usize, outputs: usize, grid: usize, f: F) -> Result<Vec<u8>>
where
    F: Fn(&[f64]) -> Vec<u16>,
{
    let mut tag = b"mft2".to_vec();
    tag.extend_from_slice(&[0; 4]);
    tag.push(inputs as u8);
    tag.push(outputs as u8);
    tag.push(grid as u8);
    tag.push(0);
    for row in 0..3 {
        for col in 0..3 {
            let v = if row == col { 1.0 } else { 0.0 };
            tag.write_i32::<BigEndian>(s15_fixed16(v))?;
        }
    }
    // Two-entry identity input and output curves.
    tag.write_u16::<BigEndian>(2)?;
    tag.write_u16::<BigEndian>(2)?;
    for _ in 0..inputs {
        tag.write_u16::<BigEndian>(0)?;
        tag.write_u16::<BigEndian>(u16::MAX)?;
    }

    let points = grid.pow(inputs as u32);
    let mut coords = vec![0.0; inputs];
    for index in 0..points {
        // First input channel varies slowest.
        let mut rest = index;
        for channel in (0..inputs).rev() {
            coords[channel] = (rest % grid) as f64 / (grid - 1) as f64;
            rest /= grid;
        }
        let values = f(&coords);
        for channel in 0..outputs {
            tag.write_u16::<BigEndian>(values.get(channel).copied().unwrap_or(0))?;
        }
    }

    for _ in 0..outputs {
        tag.write_u16::<BigEndian>(0)?;
        tag.write_u16::<BigEndian>(u16::MAX)?;
    }
    Ok(tag)
}

fn srgb_trc() -> Vec<u16> {
    (0..TRC_POINTS)
        .map(|i| {
            let x = i as f64 / (TRC_POINTS - 1) as f64;
            unit_to_u16(srgb_to_linear(x))
        })
        .collect()
}

fn srgb_to_linear(v: f64) -> f64 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(v: f64) -> f64 {
    if v <= 0.0031308 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

fn cmyk_to_lab(cmyk: &[f64]) -> [f64; 3] {
    let k = cmyk.get(3).copied().unwrap_or(0.0);
    let rgb: Vec<f64> = cmyk[..3]
        .iter()
        .map(|c| srgb_to_linear((1.0 - c) * (1.0 - k)))
        .collect();
    let xyz = mul(&SRGB_TO_XYZ, [rgb[0], rgb[1], rgb[2]]);
    xyz_to_lab(xyz)
}

fn lab_to_cmyk(lab: [f64; 3]) -> [f64; 4] {
    let linear = mul(&XYZ_TO_SRGB, lab_to_xyz(lab));
    let rgb = linear.map(|v| linear_to_srgb(v.clamp(0.0, 1.0)));
    let k = 1.0 - rgb.iter().cloned().fold(0.0, f64::max);
    if k >= 1.0 {
        return [0.0, 0.0, 0.0, 1.0];
    }
    let c = |v: f64| (1.0 - v - k) / (1.0 - k);
    [c(rgb[0]), c(rgb[1]), c(rgb[2]), k]
}

fn xyz_to_lab(xyz: [f64; 3]) -> [f64; 3] {
    let f = |t: f64| {
        if t > 216.0 / 24389.0 {
            t.cbrt()
        } else {
            (24389.0 / 27.0 * t + 16.0) / 116.0
        }
    };
    let fx = f(xyz[0] / D50[0]);
    let fy = f(xyz[1] / D50[1]);
    let fz = f(xyz[2] / D50[2]);
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

fn lab_to_xyz(lab: [f64; 3]) -> [f64; 3] {
    let fy = (lab[0] + 16.0) / 116.0;
    let fx = fy + lab[1] / 500.0;
    let fz = fy - lab[2] / 200.0;
    let finv = |t: f64| {
        if t.powi(3) > 216.0 / 24389.0 {
            t.powi(3)
        } else {
            (116.0 * t - 16.0) * 27.0 / 24389.0
        }
    };
    [finv(fx) * D50[0], finv(fy) * D50[1], finv(fz) * D50[2]]
}

/// Legacy 16-bit Lab encoding of ICC v2 lut16 tags.
fn lab_to_pcs16(lab: [f64; 3]) -> Vec<u16> {
    vec![
        (lab[0].clamp(0.0, 100.0) * 652.8).round() as u16,
        ((lab[1].clamp(-128.0, 127.996) + 128.0) * 256.0).round() as u16,
        ((lab[2].clamp(-128.0, 127.996) + 128.0) * 256.0).round() as u16,
    ]
}

fn pcs16_to_lab(unit: &[f64]) -> [f64; 3] {
    let raw: Vec<f64> = unit.iter().map(|v| v * 65535.0).collect();
    [raw[0] / 652.8, raw[1] / 256.0 - 128.0, raw[2] / 256.0 - 128.0]
}

fn mul(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn column(m: &[[f64; 3]; 3], c: usize) -> [f64; 3] {
    [m[0][c], m[1][c], m[2][c]]
}

fn unit_to_u16(v: f64) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

fn s15_fixed16(v: f64) -> i32 {
    (v * 65536.0).round() as i32
}
