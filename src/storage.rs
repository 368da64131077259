//! File Formats
//!
//! ```text
//! vector file     N ref vectors then M cmp vectors, W/8 bytes each,
//!                 MSB-first, no header, no separators
//! ID pair file    (ref_id, cmp_id) as little-endian u32, 8 bytes per pair
//! sentinel file   raw accelerator result buffer (see transfer module)
//! hex file        one vector per line, W/4 upper-case hex characters
//! match dump      ref_id \t cmp_id \t coefficient [\t ref_w \t cmp_w \t and_w]
//! ID dump         EXPECTED / ACTUAL sections, %08x \t %08x per pair
//! ```
//!
//! Every I/O failure is reported with the operation and the file path.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::bitpack::{BitVector, VectorSet, VectorWidth};
use crate::codec::FingerprintCodec;
use crate::matcher::MatchResult;
use crate::verify::{ComparisonResult, IdPair};
use crate::{Result, TanimotoError};

const ID_PAIR_BYTES: usize = 8;
const DUMP_RULE: &str = "####################################";

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| TanimotoError::io("create", path, e))
}

fn read_all(path: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut buf))
        .map_err(|e| TanimotoError::io("read", path, e))?;
    Ok(buf)
}

/// Sibling path the body is written to before the final rename
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

/// Run a writer body, then flush and move the file into place
///
/// `path` only ever holds a complete file: the body writes to a sibling
/// staging file, which is removed again if anything fails.
fn write_with<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let staging = staging_path(path);
    let mut w = create(&staging)?;
    let written = body(&mut w)
        .and_then(|_| w.flush())
        .map_err(|e| TanimotoError::io("write", path, e))
        .and_then(|_| {
            drop(w);
            std::fs::rename(&staging, path).map_err(|e| TanimotoError::io("rename", path, e))
        });
    if written.is_err() {
        let _ = std::fs::remove_file(&staging);
    }
    written
}

// ============================================================================
// VECTOR FILE
// ============================================================================

/// Write reference then comparison vectors
pub fn write_vector_file(path: impl AsRef<Path>, refs: &VectorSet, cmps: &VectorSet) -> Result<()> {
    let path = path.as_ref();
    write_with(path, |w| {
        for fp in refs.iter().chain(cmps.iter()) {
            w.write_all(&fp.data().to_be_bytes())?;
        }
        Ok(())
    })?;
    tracing::info!(path = %path.display(), refs = refs.len(), cmps = cmps.len(), "vector file written");
    Ok(())
}

/// Read a vector file; the first `ref_count` vectors are references
///
/// IDs are positional: reference `1..=N`, comparison `N+1..=N+M`.
pub fn read_vector_file(
    path: impl AsRef<Path>,
    width: VectorWidth,
    ref_count: usize,
) -> Result<(VectorSet, VectorSet)> {
    let path = path.as_ref();
    let buf = read_all(path)?;
    let record = width.bytes();
    if buf.len() % record != 0 {
        return Err(TanimotoError::SizeMismatch {
            len: buf.len(),
            record,
        });
    }
    let total = buf.len() / record;
    if ref_count > total {
        return Err(TanimotoError::MalformedInput(format!(
            "{} holds {} vectors, {} reference vectors requested",
            path.display(),
            total,
            ref_count
        )));
    }

    let (ref_bytes, cmp_bytes) = buf.split_at(ref_count * record);
    let parse = |bytes: &[u8]| {
        bytes
            .chunks_exact(record)
            .map(|chunk| BitVector::from_be_bytes(width, chunk))
            .collect::<Result<Vec<_>>>()
    };
    let first_cmp = u32::try_from(ref_count + 1)
        .map_err(|_| TanimotoError::InvalidConfig("vector ID overflow".into()))?;
    let refs = VectorSet::from_vectors(width, 1, parse(ref_bytes)?)?;
    let cmps = VectorSet::from_vectors(width, first_cmp, parse(cmp_bytes)?)?;

    tracing::info!(path = %path.display(), refs = refs.len(), cmps = cmps.len(), "vector file loaded");
    Ok((refs, cmps))
}

// ============================================================================
// ID PAIR FILE
// ============================================================================

pub fn write_id_file(path: impl AsRef<Path>, pairs: &[IdPair]) -> Result<()> {
    let path = path.as_ref();
    write_with(path, |w| {
        for p in pairs {
            w.write_all(&p.ref_id.to_le_bytes())?;
            w.write_all(&p.cmp_id.to_le_bytes())?;
        }
        Ok(())
    })?;
    tracing::info!(path = %path.display(), pairs = pairs.len(), "ID pair file written");
    Ok(())
}

pub fn read_id_file(path: impl AsRef<Path>) -> Result<Vec<IdPair>> {
    let path = path.as_ref();
    let buf = read_all(path)?;
    if buf.len() % ID_PAIR_BYTES != 0 {
        return Err(TanimotoError::SizeMismatch {
            len: buf.len(),
            record: ID_PAIR_BYTES,
        });
    }
    let le = |b: &[u8]| u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    let pairs: Vec<IdPair> = buf
        .chunks_exact(ID_PAIR_BYTES)
        .map(|c| IdPair::new(le(&c[..4]), le(&c[4..])))
        .collect();
    tracing::debug!(path = %path.display(), pairs = pairs.len(), "ID pair file loaded");
    Ok(pairs)
}

/// Raw accelerator result buffer
pub fn read_sentinel_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    read_all(path.as_ref())
}

pub fn write_sentinel_file(path: impl AsRef<Path>, buffer: &[u8]) -> Result<()> {
    write_with(path.as_ref(), |w| w.write_all(buffer))
}

// ============================================================================
// HEX TEXT
// ============================================================================

/// One vector per non-empty line, IDs from `first_id`
pub fn read_hex_vectors(path: impl AsRef<Path>, codec: &FingerprintCodec, first_id: u32) -> Result<VectorSet> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| TanimotoError::io("open", path, e))?;
    let mut vectors = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| TanimotoError::io("read", path, e))?;
        let text = line.trim_end_matches('\r');
        if text.is_empty() {
            continue;
        }
        let v = codec.encode(text).map_err(|e| {
            TanimotoError::MalformedInput(format!("{}:{}: {}", path.display(), lineno + 1, e))
        })?;
        vectors.push(v);
    }
    VectorSet::from_vectors(codec.width(), first_id, vectors)
}

/// Reference and comparison hex files, IDs continuing across both
pub fn read_hex_sets(
    refs: impl AsRef<Path>,
    cmps: impl AsRef<Path>,
    codec: &FingerprintCodec,
) -> Result<(VectorSet, VectorSet)> {
    let refs = read_hex_vectors(refs, codec, 1)?;
    let first_cmp = u32::try_from(refs.len() + 1)
        .map_err(|_| TanimotoError::InvalidConfig("vector ID overflow".into()))?;
    let cmps = read_hex_vectors(cmps, codec, first_cmp)?;
    tracing::info!(refs = refs.len(), cmps = cmps.len(), padding = ?codec.padding(), "hex vectors loaded");
    Ok((refs, cmps))
}

pub fn write_hex_vectors(path: impl AsRef<Path>, codec: &FingerprintCodec, set: &VectorSet) -> Result<()> {
    write_with(path.as_ref(), |w| {
        for fp in set.iter() {
            writeln!(w, "{}", codec.decode(fp.data()))?;
        }
        Ok(())
    })
}

// ============================================================================
// DUMPS & REPORTS
// ============================================================================

/// Tab-separated matches, one per line
pub fn write_matches<W: Write>(w: &mut W, matches: &[MatchResult], with_weights: bool) -> std::io::Result<()> {
    for m in matches {
        write!(w, "{}\t{}\t{:.6}", m.ref_id, m.cmp_id, m.coefficient)?;
        if with_weights {
            write!(w, "\t{}\t{}\t{}", m.ref_weight, m.cmp_weight, m.and_weight)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

pub fn write_match_dump(path: impl AsRef<Path>, matches: &[MatchResult], with_weights: bool) -> Result<()> {
    write_with(path.as_ref(), |w| write_matches(w, matches, with_weights))
}

/// Both pair lists, for side-by-side inspection
pub fn write_id_dump(path: impl AsRef<Path>, expected: &[IdPair], actual: &[IdPair]) -> Result<()> {
    write_with(path.as_ref(), |w| {
        for (title, pairs) in [("EXPECTED", expected), ("ACTUAL", actual)] {
            writeln!(w, "{} ID PAIRS ({}) {}", title, pairs.len(), DUMP_RULE)?;
            for p in pairs {
                writeln!(w, "{:08x}\t{:08x}", p.ref_id, p.cmp_id)?;
            }
        }
        Ok(())
    })
}

pub fn write_report(path: impl AsRef<Path>, result: &ComparisonResult) -> Result<()> {
    write_with(path.as_ref(), |w| result.write_report(w))
}
