//! WOFF and WOFF2 containers decoded back to a plain sfnt font program.

use std::io::Read;

pub(crate) const WOFF_SIGNATURE: u32 = 0x774F_4646; // wOFF
pub(crate) const WOFF2_SIGNATURE: u32 = 0x774F_4632; // wOF2
const TTC_FLAVOR: u32 = 0x7474_6366; // ttcf

const WOFF_HEADER_LEN: usize = 44;
const WOFF_DIR_ENTRY_LEN: usize = 20;
const WOFF2_HEADER_LEN: usize = 48;
const MAX_SFNT_TABLES: usize = 4095;

const TAG_GLYF: [u8; 4] = *b"glyf";
const TAG_LOCA: [u8; 4] = *b"loca";
const TAG_HMTX: [u8; 4] = *b"hmtx";
const TAG_HHEA: [u8; 4] = *b"hhea";
const TAG_HEAD: [u8; 4] = *b"head";

const WOFF2_KNOWN_TAGS: [&[u8; 4]; 63] = [
    b"cmap", b"head", b"hhea", b"hmtx", b"maxp", b"name", b"OS/2", b"post", b"cvt ", b"fpgm",
    b"glyf", b"loca", b"prep", b"CFF ", b"VORG", b"EBDT", b"EBLC", b"gasp", b"hdmx", b"kern",
    b"LTSH", b"PCLT", b"VDMX", b"vhea", b"vmtx", b"BASE", b"GDEF", b"GPOS", b"GSUB", b"EBSC",
    b"JSTF", b"MATH", b"CBDT", b"CBLC", b"COLR", b"CPAL", b"SVG ", b"sbix", b"acnt", b"avar",
    b"bdat", b"bloc", b"bsln", b"cvar", b"fdsc", b"feat", b"fmtx", b"fvar", b"gvar", b"hsty",
    b"just", b"lcar", b"mort", b"morx", b"opbd", b"prop", b"trak", b"Zapf", b"Silf", b"Glat",
    b"Gloc", b"Feat", b"Sill",
];

// Simple glyph flags.
const ON_CURVE_POINT: u8 = 0x01;
const X_SHORT_VECTOR: u8 = 0x02;
const Y_SHORT_VECTOR: u8 = 0x04;
const X_IS_SAME_OR_POSITIVE: u8 = 0x10;
const Y_IS_SAME_OR_POSITIVE: u8 = 0x20;
const OVERLAP_SIMPLE: u8 = 0x40;

// Composite glyph flags.
const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
const WE_HAVE_A_SCALE: u16 = 0x0008;
const MORE_COMPONENTS: u16 = 0x0020;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;
const WE_HAVE_INSTRUCTIONS: u16 = 0x0100;

type DecodeResult<T> = std::result::Result<T, String>;

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| format!("truncated data at offset {}", self.pos))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> DecodeResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> DecodeResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> DecodeResult<i16> {
        Ok(self.u16()? as i16)
    }

    fn u32(&mut self) -> DecodeResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn uint_base128(&mut self) -> DecodeResult<u32> {
        let mut value: u32 = 0;
        for i in 0..5 {
            let byte = self.u8()?;
            if i == 0 && byte == 0x80 {
                return Err("UIntBase128 has leading zeros".to_string());
            }
            if value & 0xFE00_0000 != 0 {
                return Err("UIntBase128 overflows u32".to_string());
            }
            value = (value << 7) | (byte & 0x7f) as u32;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err("UIntBase128 longer than five bytes".to_string())
    }

    fn uint_255(&mut self) -> DecodeResult<u16> {
        let code = self.u8()?;
        match code {
            253 => self.u16(),
            254 => Ok(self.u8()? as u16 + 506),
            255 => Ok(self.u8()? as u16 + 253),
            _ => Ok(code as u16),
        }
    }
}

fn read_u16_at(data: &[u8], offset: usize) -> DecodeResult<u16> {
    let mut reader = ByteReader::new(data);
    reader.pos = offset;
    reader.u16()
}

/// Decodes a WOFF 1.0 container. Tables are zlib streams unless stored.
pub(crate) fn decode_woff(data: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut reader = ByteReader::new(data);
    if reader.u32()? != WOFF_SIGNATURE {
        return Err("missing wOFF signature".to_string());
    }
    let flavor = reader.u32()?;
    if flavor == TTC_FLAVOR {
        return Err("font collections are not supported".to_string());
    }
    let _length = reader.u32()?;
    let num_tables = reader.u16()? as usize;
    if num_tables == 0 {
        return Err("WOFF has no tables".to_string());
    }
    check_table_count(num_tables)?;
    reader.pos = WOFF_HEADER_LEN;

    let mut tables = Vec::with_capacity(num_tables);
    for _ in 0..num_tables {
        let entry = reader.bytes(WOFF_DIR_ENTRY_LEN)?;
        let mut e = ByteReader::new(entry);
        let tag: [u8; 4] = [entry[0], entry[1], entry[2], entry[3]];
        e.pos = 4;
        let offset = e.u32()? as usize;
        let comp_length = e.u32()? as usize;
        let orig_length = e.u32()? as usize;
        let stored = data
            .get(offset..offset.saturating_add(comp_length))
            .ok_or_else(|| format!("table {} out of bounds", tag_name(&tag)))?;
        let table = if comp_length < orig_length {
            let mut out = Vec::with_capacity(orig_length);
            flate2::read::ZlibDecoder::new(stored)
                .read_to_end(&mut out)
                .map_err(|err| format!("table {}: {}", tag_name(&tag), err))?;
            out
        } else if comp_length == orig_length {
            stored.to_vec()
        } else {
            return Err(format!(
                "table {} is larger compressed than uncompressed",
                tag_name(&tag)
            ));
        };
        if table.len() != orig_length {
            return Err(format!(
                "table {} decoded to {} bytes, expected {}",
                tag_name(&tag),
                table.len(),
                orig_length
            ));
        }
        tables.push((tag, table));
    }

    build_sfnt(flavor, tables)
}

struct Woff2Entry {
    tag: [u8; 4],
    orig_length: usize,
    stream_length: usize,
    transformed: bool,
}

/// Decodes a WOFF2 container, including the glyf/loca and hmtx transforms.
pub(crate) fn decode_woff2(data: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut reader = ByteReader::new(data);
    if reader.u32()? != WOFF2_SIGNATURE {
        return Err("missing wOF2 signature".to_string());
    }
    let flavor = reader.u32()?;
    if flavor == TTC_FLAVOR {
        return Err("font collections are not supported".to_string());
    }
    let _length = reader.u32()?;
    let num_tables = reader.u16()? as usize;
    let _reserved = reader.u16()?;
    let _total_sfnt_size = reader.u32()?;
    let total_compressed_size = reader.u32()? as usize;
    if num_tables == 0 {
        return Err("WOFF2 has no tables".to_string());
    }
    check_table_count(num_tables)?;
    reader.pos = WOFF2_HEADER_LEN;

    let mut entries = Vec::with_capacity(num_tables);
    for _ in 0..num_tables {
        let flags = reader.u8()?;
        let tag_index = (flags & 0x3f) as usize;
        let tag = if tag_index == 63 {
            let b = reader.bytes(4)?;
            [b[0], b[1], b[2], b[3]]
        } else {
            *WOFF2_KNOWN_TAGS[tag_index]
        };
        let version = flags >> 6;
        let orig_length = reader.uint_base128()? as usize;
        let transformed = if tag == TAG_GLYF || tag == TAG_LOCA {
            version == 0
        } else {
            version != 0
        };
        let stream_length = if transformed {
            reader.uint_base128()? as usize
        } else {
            orig_length
        };
        if transformed && tag != TAG_GLYF && tag != TAG_LOCA && tag != TAG_HMTX {
            return Err(format!("unknown transform for table {}", tag_name(&tag)));
        }
        entries.push(Woff2Entry {
            tag,
            orig_length,
            stream_length,
            transformed,
        });
    }

    let compressed = reader.bytes(total_compressed_size)?;
    let mut stream = Vec::new();
    brotli_decompressor::Decompressor::new(compressed, 4096)
        .read_to_end(&mut stream)
        .map_err(|err| format!("brotli stream: {}", err))?;

    let mut slices: Vec<&[u8]> = Vec::with_capacity(entries.len());
    let mut offset = 0usize;
    for entry in &entries {
        let end = offset
            .checked_add(entry.stream_length)
            .filter(|end| *end <= stream.len())
            .ok_or_else(|| format!("table {} exceeds decompressed data", tag_name(&entry.tag)))?;
        slices.push(&stream[offset..end]);
        offset = end;
    }

    let find = |tag: [u8; 4]| entries.iter().position(|entry| entry.tag == tag);
    let mut rebuilt: Vec<Option<Vec<u8>>> = vec![None; entries.len()];
    let mut x_mins: Option<Vec<i16>> = None;

    if let Some(glyf_idx) = find(TAG_GLYF).filter(|idx| entries[*idx].transformed) {
        let loca_idx = find(TAG_LOCA).ok_or("transformed glyf without loca")?;
        let glyphs = reconstruct_glyf(slices[glyf_idx])?;
        if glyphs.loca.len() != entries[loca_idx].orig_length {
            return Err("reconstructed loca length mismatch".to_string());
        }
        rebuilt[glyf_idx] = Some(glyphs.glyf);
        rebuilt[loca_idx] = Some(glyphs.loca);
        x_mins = Some(glyphs.x_mins);
    }

    if let Some(hmtx_idx) = find(TAG_HMTX).filter(|idx| entries[*idx].transformed) {
        let x_mins = x_mins.as_deref().ok_or("transformed hmtx requires transformed glyf")?;
        let hhea_idx = find(TAG_HHEA).ok_or("transformed hmtx without hhea")?;
        let num_h_metrics = read_u16_at(slices[hhea_idx], 34)? as usize;
        let hmtx = reconstruct_hmtx(slices[hmtx_idx], num_h_metrics, x_mins)?;
        if hmtx.len() != entries[hmtx_idx].orig_length {
            return Err("reconstructed hmtx length mismatch".to_string());
        }
        rebuilt[hmtx_idx] = Some(hmtx);
    }

    let tables = entries
        .iter()
        .zip(slices)
        .zip(rebuilt)
        .map(|((entry, slice), rebuilt)| (entry.tag, rebuilt.unwrap_or_else(|| slice.to_vec())))
        .collect();
    build_sfnt(flavor, tables)
}

pub(crate) struct ReconstructedGlyphs {
    pub(crate) glyf: Vec<u8>,
    pub(crate) loca: Vec<u8>,
    pub(crate) x_mins: Vec<i16>,
}

pub(crate) fn reconstruct_glyf(data: &[u8]) -> DecodeResult<ReconstructedGlyphs> {
    let mut header = ByteReader::new(data);
    let _version = header.u16()?;
    let option_flags = header.u16()?;
    let num_glyphs = header.u16()? as usize;
    let index_format = header.u16()?;
    let mut sizes = [0usize; 7];
    for size in sizes.iter_mut() {
        *size = header.u32()? as usize;
    }
    let mut streams: Vec<&[u8]> = Vec::with_capacity(7);
    for size in sizes {
        streams.push(header.bytes(size)?);
    }
    let overlap_bitmap = if option_flags & 1 != 0 {
        Some(header.bytes(num_glyphs.div_ceil(8))?)
    } else {
        None
    };

    let mut n_contours = ByteReader::new(streams[0]);
    let mut n_points = ByteReader::new(streams[1]);
    let mut flags = ByteReader::new(streams[2]);
    let mut glyphs = ByteReader::new(streams[3]);
    let mut composites = ByteReader::new(streams[4]);
    let bbox_bitmap_len = 4 * num_glyphs.div_ceil(32);
    let mut bboxes = ByteReader::new(streams[5]);
    let bbox_bitmap = bboxes.bytes(bbox_bitmap_len)?;
    let mut instructions = ByteReader::new(streams[6]);

    let has_bit = |bitmap: &[u8], index: usize| bitmap[index >> 3] & (0x80 >> (index & 7)) != 0;

    let mut glyf = Vec::new();
    let mut offsets = Vec::with_capacity(num_glyphs + 1);
    let mut x_mins = Vec::with_capacity(num_glyphs);

    for index in 0..num_glyphs {
        offsets.push(glyf.len());
        let contours = n_contours.i16()?;
        let explicit_bbox = has_bit(bbox_bitmap, index);

        if contours == 0 {
            if explicit_bbox {
                return Err(format!("empty glyph {} has a bounding box", index));
            }
            x_mins.push(0);
            continue;
        }

        if contours < 0 {
            if !explicit_bbox {
                return Err(format!("composite glyph {} lacks a bounding box", index));
            }
            let bbox = bboxes.bytes(8)?;
            let start = composites.pos;
            let mut have_instructions = false;
            loop {
                let flag = composites.u16()?;
                let _glyph = composites.u16()?;
                let mut skip = if flag & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
                if flag & WE_HAVE_A_SCALE != 0 {
                    skip += 2;
                } else if flag & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
                    skip += 4;
                } else if flag & WE_HAVE_A_TWO_BY_TWO != 0 {
                    skip += 8;
                }
                composites.bytes(skip)?;
                have_instructions |= flag & WE_HAVE_INSTRUCTIONS != 0;
                if flag & MORE_COMPONENTS == 0 {
                    break;
                }
            }
            let component_data = &streams[4][start..composites.pos];
            glyf.extend_from_slice(&(-1i16).to_be_bytes());
            glyf.extend_from_slice(bbox);
            glyf.extend_from_slice(component_data);
            if have_instructions {
                let len = glyphs.uint_255()?;
                glyf.extend_from_slice(&len.to_be_bytes());
                glyf.extend_from_slice(instructions.bytes(len as usize)?);
            }
            x_mins.push(i16::from_be_bytes([bbox[0], bbox[1]]));
            pad_to_four(&mut glyf);
            continue;
        }

        let mut end_points = Vec::with_capacity(contours as usize);
        let mut total_points = 0usize;
        for _ in 0..contours {
            total_points += n_points.uint_255()? as usize;
            let end = total_points
                .checked_sub(1)
                .and_then(|last| u16::try_from(last).ok())
                .ok_or_else(|| format!("glyph {} has invalid contour ends", index))?;
            end_points.push(end);
        }

        let mut points = Vec::with_capacity(total_points);
        let (mut x, mut y) = (0i32, 0i32);
        for _ in 0..total_points {
            let flag = flags.u8()?;
            let (dx, dy, on_curve) = decode_triplet(flag, &mut glyphs)?;
            x += dx;
            y += dy;
            points.push((x, y, on_curve));
        }
        let instruction_len = glyphs.uint_255()?;
        let instruction_bytes = instructions.bytes(instruction_len as usize)?;

        let bbox = if explicit_bbox {
            let mut b = ByteReader::new(bboxes.bytes(8)?);
            [b.i16()?, b.i16()?, b.i16()?, b.i16()?]
        } else {
            compute_bbox(&points)
        };
        let overlap = overlap_bitmap.is_some_and(|bitmap| has_bit(bitmap, index));

        glyf.extend_from_slice(&contours.to_be_bytes());
        for value in bbox {
            glyf.extend_from_slice(&value.to_be_bytes());
        }
        for end in &end_points {
            glyf.extend_from_slice(&end.to_be_bytes());
        }
        glyf.extend_from_slice(&instruction_len.to_be_bytes());
        glyf.extend_from_slice(instruction_bytes);
        encode_points(&points, overlap, &mut glyf)?;
        x_mins.push(bbox[0]);
        pad_to_four(&mut glyf);
    }
    offsets.push(glyf.len());

    let mut loca = Vec::with_capacity(offsets.len() * 4);
    for offset in offsets {
        if index_format == 0 {
            let half = u16::try_from(offset / 2).map_err(|_| "glyf too large for short loca")?;
            loca.extend_from_slice(&half.to_be_bytes());
        } else {
            loca.extend_from_slice(&(offset as u32).to_be_bytes());
        }
    }

    Ok(ReconstructedGlyphs { glyf, loca, x_mins })
}

fn with_sign(flag: u8, base: i32) -> i32 {
    if flag & 1 != 0 { base } else { -base }
}

/// Decodes one point delta from the glyph stream.
fn decode_triplet(flag: u8, glyphs: &mut ByteReader<'_>) -> DecodeResult<(i32, i32, bool)> {
    let on_curve = flag & 0x80 == 0;
    let flag = flag & 0x7f;
    let (dx, dy) = if flag < 10 {
        let b0 = glyphs.u8()? as i32;
        (0, with_sign(flag, (((flag & 14) as i32) << 7) + b0))
    } else if flag < 20 {
        let b0 = glyphs.u8()? as i32;
        (with_sign(flag, ((((flag - 10) & 14) as i32) << 7) + b0), 0)
    } else if flag < 84 {
        let b0 = (flag - 20) as i32;
        let b1 = glyphs.u8()? as i32;
        (
            with_sign(flag, 1 + (b0 & 0x30) + (b1 >> 4)),
            with_sign(flag >> 1, 1 + ((b0 & 0x0c) << 2) + (b1 & 0x0f)),
        )
    } else if flag < 120 {
        let b0 = (flag - 84) as i32;
        let bytes = glyphs.bytes(2)?;
        (
            with_sign(flag, 1 + ((b0 / 12) << 8) + bytes[0] as i32),
            with_sign(flag >> 1, 1 + (((b0 % 12) >> 2) << 8) + bytes[1] as i32),
        )
    } else if flag < 124 {
        let bytes = glyphs.bytes(3)?;
        let b2 = bytes[1] as i32;
        (
            with_sign(flag, ((bytes[0] as i32) << 4) + (b2 >> 4)),
            with_sign(flag >> 1, ((b2 & 0x0f) << 8) + bytes[2] as i32),
        )
    } else {
        let bytes = glyphs.bytes(4)?;
        (
            with_sign(flag, ((bytes[0] as i32) << 8) + bytes[1] as i32),
            with_sign(flag >> 1, ((bytes[2] as i32) << 8) + bytes[3] as i32),
        )
    };
    Ok((dx, dy, on_curve))
}

fn compute_bbox(points: &[(i32, i32, bool)]) -> [i16; 4] {
    let Some(&(x0, y0, _)) = points.first() else {
        return [0; 4];
    };
    let (mut x_min, mut y_min, mut x_max, mut y_max) = (x0, y0, x0, y0);
    for &(x, y, _) in points {
        x_min = x_min.min(x);
        y_min = y_min.min(y);
        x_max = x_max.max(x);
        y_max = y_max.max(y);
    }
    [x_min, y_min, x_max, y_max].map(|v| v.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
}

/// Writes flags and coordinates in glyf encoding without flag repeats.
fn encode_points(points: &[(i32, i32, bool)], overlap: bool, out: &mut Vec<u8>) -> DecodeResult<()> {
    let mut flag_bytes = Vec::with_capacity(points.len());
    let mut x_bytes = Vec::new();
    let mut y_bytes = Vec::new();
    let (mut last_x, mut last_y) = (0i32, 0i32);
    for (index, &(x, y, on_curve)) in points.iter().enumerate() {
        let mut flag = if on_curve { ON_CURVE_POINT } else { 0 };
        if overlap && index == 0 {
            flag |= OVERLAP_SIMPLE;
        }
        let dx = x - last_x;
        let dy = y - last_y;
        flag |= encode_delta(dx, X_SHORT_VECTOR, X_IS_SAME_OR_POSITIVE, &mut x_bytes)?;
        flag |= encode_delta(dy, Y_SHORT_VECTOR, Y_IS_SAME_OR_POSITIVE, &mut y_bytes)?;
        flag_bytes.push(flag);
        last_x = x;
        last_y = y;
    }
    out.extend_from_slice(&flag_bytes);
    out.extend_from_slice(&x_bytes);
    out.extend_from_slice(&y_bytes);
    Ok(())
}

fn encode_delta(delta: i32, short: u8, same_or_positive: u8, out: &mut Vec<u8>) -> DecodeResult<u8> {
    if delta == 0 {
        return Ok(same_or_positive);
    }
    if delta.abs() < 256 {
        out.push(delta.unsigned_abs() as u8);
        return Ok(short | if delta > 0 { same_or_positive } else { 0 });
    }
    let value = i16::try_from(delta).map_err(|_| format!("coordinate delta {} overflows", delta))?;
    out.extend_from_slice(&value.to_be_bytes());
    Ok(0)
}

pub(crate) fn reconstruct_hmtx(
    data: &[u8],
    num_h_metrics: usize,
    x_mins: &[i16],
) -> DecodeResult<Vec<u8>> {
    let num_glyphs = x_mins.len();
    if num_h_metrics == 0 || num_h_metrics > num_glyphs {
        return Err(format!(
            "numberOfHMetrics {} invalid for {} glyphs",
            num_h_metrics, num_glyphs
        ));
    }
    let mut reader = ByteReader::new(data);
    let flags = reader.u8()?;
    let mut advances = Vec::with_capacity(num_h_metrics);
    for _ in 0..num_h_metrics {
        advances.push(reader.u16()?);
    }
    let mut lsbs = Vec::with_capacity(num_glyphs);
    for index in 0..num_h_metrics {
        lsbs.push(if flags & 1 != 0 {
            x_mins[index]
        } else {
            reader.i16()?
        });
    }
    for index in num_h_metrics..num_glyphs {
        lsbs.push(if flags & 2 != 0 {
            x_mins[index]
        } else {
            reader.i16()?
        });
    }

    let mut out = Vec::with_capacity(num_h_metrics * 4 + (num_glyphs - num_h_metrics) * 2);
    for (index, lsb) in lsbs.iter().enumerate() {
        if let Some(advance) = advances.get(index) {
            out.extend_from_slice(&advance.to_be_bytes());
        }
        out.extend_from_slice(&lsb.to_be_bytes());
    }
    Ok(out)
}

fn pad_to_four(data: &mut Vec<u8>) {
    while data.len() % 4 != 0 {
        data.push(0);
    }
}

fn table_checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

fn tag_name(tag: &[u8; 4]) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

/// Assembles an sfnt with a sorted table directory, 4-byte aligned tables
/// and fresh checksums.
pub(crate) fn build_sfnt(
    flavor: u32,
    mut tables: Vec<([u8; 4], Vec<u8>)>,
) -> DecodeResult<Vec<u8>> {
    check_table_count(tables.len())?;
    tables.sort_by(|a, b| a.0.cmp(&b.0));
    let num_tables = tables.len() as u32;
    let mut entry_selector = 0u32;
    while (2u32 << entry_selector) <= num_tables {
        entry_selector += 1;
    }
    let search_range = (1u32 << entry_selector) * 16;
    let range_shift = num_tables * 16 - search_range;

    let mut out = Vec::new();
    out.extend_from_slice(&flavor.to_be_bytes());
    for field in [num_tables, search_range, entry_selector, range_shift] {
        out.extend_from_slice(&(field as u16).to_be_bytes());
    }

    let mut offset = 12 + tables.len() * 16;
    let mut head_offset = None;
    for (tag, data) in &mut tables {
        if *tag == TAG_HEAD && data.len() >= 12 {
            data[8..12].copy_from_slice(&[0; 4]);
            head_offset = Some(offset);
        }
        out.extend_from_slice(tag);
        out.extend_from_slice(&table_checksum(data).to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        offset += data.len().div_ceil(4) * 4;
    }
    for (_, data) in &tables {
        out.extend_from_slice(data);
        pad_to_four(&mut out);
    }

    if let Some(head_offset) = head_offset {
        let adjustment = 0xB1B0_AFBAu32.wrapping_sub(table_checksum(&out));
        out[head_offset + 8..head_offset + 12].copy_from_slice(&adjustment.to_be_bytes());
    }
    Ok(out)
}

// searchRange is (largest power of two <= numTables) * 16 and must fit in 16 bits.
fn check_table_count(num_tables: usize) -> DecodeResult<()> {
    if num_tables > MAX_SFNT_TABLES {
        return Err(format!(
            "{} tables exceed the sfnt limit of {}",
            num_tables, MAX_SFNT_TABLES
        ));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    /// Wraps `data` in a brotli stream made of one uncompressed meta-block.
    pub(crate) fn brotli_stored(data: &[u8]) -> Vec<u8> {
        assert!(!data.is_empty() && data.len() <= 65_536);
        let v = (((data.len() - 1) as u32) << 4) | (1 << 20);
        let mut out = vec![(v & 0xff) as u8, ((v >> 8) & 0xff) as u8, ((v >> 16) & 0xff) as u8];
        out.extend_from_slice(data);
        out.push(0x03);
        out
    }

    fn base128(mut value: u32) -> Vec<u8> {
        let mut bytes = vec![(value & 0x7f) as u8];
        value >>= 7;
        while value > 0 {
            bytes.push(((value & 0x7f) as u8) | 0x80);
            value >>= 7;
        }
        bytes.reverse();
        bytes
    }

    /// Parses an sfnt directory into (tag, data) pairs.
    pub(crate) fn sfnt_tables(font: &[u8]) -> Vec<([u8; 4], Vec<u8>)> {
        let count = u16::from_be_bytes([font[4], font[5]]) as usize;
        (0..count)
            .map(|i| {
                let rec = &font[12 + i * 16..28 + i * 16];
                let offset = u32::from_be_bytes([rec[8], rec[9], rec[10], rec[11]]) as usize;
                let len = u32::from_be_bytes([rec[12], rec[13], rec[14], rec[15]]) as usize;
                ([rec[0], rec[1], rec[2], rec[3]], font[offset..offset + len].to_vec())
            })
            .collect()
    }

    pub(crate) fn woff_wrap(flavor: u32, tables: &[([u8; 4], Vec<u8>, bool)]) -> Vec<u8> {
        let mut body = Vec::new();
        let mut dir = Vec::new();
        let base = WOFF_HEADER_LEN + tables.len() * WOFF_DIR_ENTRY_LEN;
        for (tag, data, compress) in tables {
            let stored = if *compress {
                let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
                enc.write_all(data).expect("compress");
                enc.finish().expect("finish")
            } else {
                data.clone()
            };
            dir.extend_from_slice(tag);
            dir.extend_from_slice(&((base + body.len()) as u32).to_be_bytes());
            dir.extend_from_slice(&(stored.len() as u32).to_be_bytes());
            dir.extend_from_slice(&(data.len() as u32).to_be_bytes());
            dir.extend_from_slice(&table_checksum(data).to_be_bytes());
            body.extend_from_slice(&stored);
            pad_to_four(&mut body);
        }
        let mut out = Vec::new();
        out.extend_from_slice(&WOFF_SIGNATURE.to_be_bytes());
        out.extend_from_slice(&flavor.to_be_bytes());
        out.extend_from_slice(&((base + body.len()) as u32).to_be_bytes());
        out.extend_from_slice(&(tables.len() as u16).to_be_bytes());
        out.extend_from_slice(&[0u8; WOFF_HEADER_LEN - 14]);
        out.extend_from_slice(&dir);
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn base128_and_255_decoding() {
        assert_eq!(ByteReader::new(&[0x3f]).uint_base128(), Ok(63));
        assert_eq!(ByteReader::new(&[0x81, 0x00]).uint_base128(), Ok(128));
        assert!(ByteReader::new(&[0x80, 0x01]).uint_base128().is_err());
        assert!(ByteReader::new(&[0xff; 6]).uint_base128().is_err());

        assert_eq!(ByteReader::new(&[10]).uint_255(), Ok(10));
        assert_eq!(ByteReader::new(&[253, 0x01, 0x00]).uint_255(), Ok(256));
        assert_eq!(ByteReader::new(&[255, 3]).uint_255(), Ok(256));
        assert_eq!(ByteReader::new(&[254, 0]).uint_255(), Ok(506));
    }

    #[test]
    fn triplet_signs_follow_flag_bits() {
        assert_eq!(decode_triplet(0, &mut ByteReader::new(&[5])), Ok((0, -5, true)));
        assert_eq!(decode_triplet(1, &mut ByteReader::new(&[5])), Ok((0, 5, true)));
        assert_eq!(
            decode_triplet(0x80 | 11, &mut ByteReader::new(&[100])),
            Ok((100, 0, false))
        );
        assert_eq!(decode_triplet(86, &mut ByteReader::new(&[49, 99])), Ok((-50, 100, true)));
        assert_eq!(
            decode_triplet(127, &mut ByteReader::new(&[0x01, 0x00, 0x02, 0x00])),
            Ok((256, 512, true))
        );
    }

    #[test]
    fn table_count_past_sfnt_limit_is_rejected() {
        let tables: Vec<([u8; 4], Vec<u8>, bool)> = (0..=MAX_SFNT_TABLES as u32)
            .map(|i| (i.to_be_bytes(), Vec::new(), false))
            .collect();
        assert_eq!(tables.len(), 4096);
        let err = decode_woff(&woff_wrap(0x0001_0000, &tables)).expect_err("too many tables");
        assert!(err.contains("4096 tables"), "{err}");

        let mut woff2 = WOFF2_SIGNATURE.to_be_bytes().to_vec();
        woff2.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        woff2.extend_from_slice(&(WOFF2_HEADER_LEN as u32).to_be_bytes());
        woff2.extend_from_slice(&4096u16.to_be_bytes());
        woff2.resize(WOFF2_HEADER_LEN, 0);
        assert!(decode_woff2(&woff2).is_err());

        let empty: Vec<([u8; 4], Vec<u8>)> =
            (0..4096u32).map(|i| (i.to_be_bytes(), Vec::new())).collect();
        assert!(build_sfnt(0x0001_0000, empty).is_err());
    }

    #[test]
    fn directory_search_fields_at_the_table_limit() {
        let tables: Vec<([u8; 4], Vec<u8>)> = (0..MAX_SFNT_TABLES as u32)
            .map(|i| (i.to_be_bytes(), Vec::new()))
            .collect();
        let sfnt = build_sfnt(0x0001_0000, tables).expect("build");
        let field = |at: usize| u16::from_be_bytes([sfnt[at], sfnt[at + 1]]);
        assert_eq!(field(4), 4095);
        assert_eq!(field(6), 2048 * 16);
        assert_eq!(field(8), 11);
        assert_eq!(field(10), 4095 * 16 - 2048 * 16);
    }

    #[test]
    fn woff1_tables_round_trip() {
        let head = {
            let mut head = vec![0u8; 54];
            head[12..16].copy_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
            head
        };
        let name = b"frameshot ".repeat(20);
        let woff = woff_wrap(
            0x0001_0000,
            &[(*b"head", head.clone(), false), (*b"name", name.clone(), true)],
        );
        let sfnt = decode_woff(&woff).expect("decode");
        assert_eq!(&sfnt[0..4], &[0, 1, 0, 0]);
        let tables = sfnt_tables(&sfnt);
        assert_eq!(tables.len(), 2);
        assert_eq!(&tables[0].0, b"head");
        assert_eq!(&tables[0].1[12..16], &head[12..16]);
        assert_eq!(tables[1], (*b"name", name));
        assert_eq!(table_checksum(&sfnt), 0xB1B0_AFBA);
    }

    #[test]
    fn woff1_rejects_collections() {
        let woff = woff_wrap(TTC_FLAVOR, &[(*b"name", vec![1, 2, 3, 4], false)]);
        assert!(decode_woff(&woff).is_err());
    }

    fn triangle_glyf_stream() -> Vec<u8> {
        let n_contours = [0u8, 0, 0, 1];
        let n_points = [3u8];
        let flags = [0u8, 11, 86];
        let glyphs = [0u8, 100, 49, 99, 0];
        let bbox_bitmap = [0u8; 4];
        let mut out = Vec::new();
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&2u16.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        for len in [n_contours.len(), n_points.len(), flags.len(), glyphs.len(), 0, 4, 0] {
            out.extend_from_slice(&(len as u32).to_be_bytes());
        }
        out.extend_from_slice(&n_contours);
        out.extend_from_slice(&n_points);
        out.extend_from_slice(&flags);
        out.extend_from_slice(&glyphs);
        out.extend_from_slice(&bbox_bitmap);
        out
    }

    const TRIANGLE_GLYPH: [u8; 20] = [
        0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x64, 0x00, 0x64, // header
        0x00, 0x02, // end points
        0x00, 0x00, // instructions
        0x31, 0x33, 0x27, // flags
        100, 50, // x
        100, // y
    ];

    #[test]
    fn transformed_glyf_rebuilds_simple_glyph_and_loca() {
        let glyphs = reconstruct_glyf(&triangle_glyf_stream()).expect("glyf");
        assert_eq!(glyphs.glyf, TRIANGLE_GLYPH.to_vec());
        let mut loca = Vec::new();
        for offset in [0u32, 0, 20] {
            loca.extend_from_slice(&offset.to_be_bytes());
        }
        assert_eq!(glyphs.loca, loca);
        assert_eq!(glyphs.x_mins, vec![0, 0]);
    }

    #[test]
    fn transformed_hmtx_takes_bearings_from_glyf() {
        let mut data = vec![0x03u8];
        data.extend_from_slice(&500u16.to_be_bytes());
        let hmtx = reconstruct_hmtx(&data, 1, &[-5, 7]).expect("hmtx");
        assert_eq!(hmtx, vec![0x01, 0xF4, 0xFF, 0xFB, 0x00, 0x07]);
    }

    #[test]
    fn woff2_with_transformed_glyf_decodes() {
        let glyf = triangle_glyf_stream();
        let name = b"name".repeat(3);
        let custom = vec![9u8, 8, 7, 6, 5];
        let mut stream = Vec::new();
        stream.extend_from_slice(&name);
        stream.extend_from_slice(&glyf);
        stream.extend_from_slice(&custom);
        let compressed = brotli_stored(&stream);

        let mut dir = Vec::new();
        dir.push(5);
        dir.extend(base128(name.len() as u32));
        dir.push(10);
        dir.extend(base128(20));
        dir.extend(base128(glyf.len() as u32));
        dir.push(11);
        dir.extend(base128(12));
        dir.extend(base128(0));
        dir.push(63);
        dir.extend_from_slice(b"zzzz");
        dir.extend(base128(custom.len() as u32));

        let mut woff2 = Vec::new();
        woff2.extend_from_slice(&WOFF2_SIGNATURE.to_be_bytes());
        woff2.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        woff2.extend_from_slice(&0u32.to_be_bytes());
        woff2.extend_from_slice(&4u16.to_be_bytes());
        woff2.extend_from_slice(&0u16.to_be_bytes());
        woff2.extend_from_slice(&0u32.to_be_bytes());
        woff2.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        woff2.extend_from_slice(&[0u8; WOFF2_HEADER_LEN - 24]);
        woff2.extend_from_slice(&dir);
        woff2.extend_from_slice(&compressed);

        let sfnt = decode_woff2(&woff2).expect("decode");
        let tables = sfnt_tables(&sfnt);
        let tags: Vec<&[u8; 4]> = tables.iter().map(|(tag, _)| tag).collect();
        assert_eq!(tags, vec![b"glyf", b"loca", b"name", b"zzzz"]);
        assert_eq!(tables[0].1, TRIANGLE_GLYPH.to_vec());
        assert_eq!(tables[1].1.len(), 12);
        assert_eq!(tables[2].1, name);
        assert_eq!(tables[3].1, custom);
    }

    #[test]
    fn woff2_rejects_truncated_stream() {
        let mut woff2 = Vec::new();
        woff2.extend_from_slice(&WOFF2_SIGNATURE.to_be_bytes());
        woff2.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        woff2.extend_from_slice(&[0u8; 4]);
        woff2.extend_from_slice(&1u16.to_be_bytes());
        woff2.extend_from_slice(&[0u8; WOFF2_HEADER_LEN - 14]);
        woff2.push(5);
        woff2.extend(base128(100));
        assert!(decode_woff2(&woff2).is_err());
    }
}
