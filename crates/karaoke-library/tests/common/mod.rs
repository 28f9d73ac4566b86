#![allow(dead_code)]

use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use karaoke_core::{EventSink, IndexEntry, PipelineEvent};
use karaoke_library::{PackerConfigBuilder, packing::NcnPayload};
use zip::ZipArchive;

/// Bytes pseudoaleatorios (incompresibles) y reproducibles.
pub fn noise(seed: u64, len: usize) -> Vec<u8> {
    let mut x = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    (0..len)
        .map(|_| {
            x = x
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (x >> 33) as u8
        })
        .collect()
}

pub fn write_ncn(dir: &Path, stem: &str, seed: u64, len: usize) -> NcnPayload {
    fs::create_dir_all(dir).unwrap();
    let payload = NcnPayload {
        mid: noise(seed, len),
        lyr: noise(seed + 1, len),
        cur: noise(seed + 2, len),
    };
    fs::write(dir.join(format!("{stem}.mid")), &payload.mid).unwrap();
    fs::write(dir.join(format!("{stem}.lyr")), &payload.lyr).unwrap();
    fs::write(dir.join(format!("{stem}.cur")), &payload.cur).unwrap();
    payload
}

pub fn write_emk(dir: &Path, stem: &str, seed: u64, len: usize) -> Vec<u8> {
    fs::create_dir_all(dir).unwrap();
    let bytes = noise(seed, len);
    fs::write(dir.join(format!("{stem}.emk")), &bytes).unwrap();
    bytes
}

/// 10 canciones planas: EMK en 2, 5 y 8; el resto NCN. Las 6 primeras pesan el doble.
pub fn ten_song_collection(dir: &Path) {
    for i in 0..10u64 {
        let stem = format!("song{i:02}");
        let per_song = if i < 6 { 6000 } else { 3000 };
        if matches!(i, 2 | 5 | 8) {
            write_emk(dir, &stem, i * 10, per_song);
        } else {
            write_ncn(dir, &stem, i * 10, per_song / 3);
        }
    }
}

pub fn base_config(input: &Path, output: &Path) -> PackerConfigBuilder {
    let mut b = PackerConfigBuilder::default();
    b.input_dir(input).output_dir(output).batch_size(3usize).workers(2usize);
    b
}

pub fn zip_members(path: &Path) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(fs::read(path).unwrap())).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

pub fn read_chunks(output: &Path) -> Vec<Vec<IndexEntry>> {
    let dir = output.join("Data").join("preview_chunk_v6");
    let mut k = 0;
    let mut out = Vec::new();
    loop {
        let path = dir.join(format!("{k}.json"));
        if !path.exists() {
            return out;
        }
        out.push(serde_json::from_slice(&fs::read(path).unwrap()).unwrap());
        k += 1;
    }
}

pub fn group_archives(output: &Path) -> Vec<PathBuf> {
    (0..)
        .map(|g| output.join(format!("karaoke_{g}.zip")))
        .take_while(|p| p.exists())
        .collect()
}

/// Sink que guarda todos los eventos.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<PipelineEvent>>>);

impl Recorder {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl EventSink for Recorder {
    fn emit(&self, event: PipelineEvent) {
        self.0.lock().unwrap().push(event);
    }
}

/// Tabla dBASE mínima con columnas de carácter.
pub fn build_dbf(fields: &[(&str, usize)], rows: &[(bool, Vec<Vec<u8>>)]) -> Vec<u8> {
    let header_length = 32 + fields.len() * 32 + 1;
    let record_length = 1 + fields.iter().map(|(_, l)| l).sum::<usize>();

    let mut out = vec![0u8; 32];
    out[0] = 0x03;
    out[4..8].copy_from_slice(&(rows.len() as u32).to_le_bytes());
    out[8..10].copy_from_slice(&(header_length as u16).to_le_bytes());
    out[10..12].copy_from_slice(&(record_length as u16).to_le_bytes());
    for (name, len) in fields {
        let mut desc = [0u8; 32];
        desc[..name.len()].copy_from_slice(name.as_bytes());
        desc[11] = b'C';
        desc[16] = *len as u8;
        out.extend_from_slice(&desc);
    }
    out.push(0x0D);
    for (deleted, values) in rows {
        out.push(if *deleted { b'*' } else { b' ' });
        for ((_, len), value) in fields.iter().zip(values) {
            let mut cell = vec![b' '; *len];
            cell[..value.len()].copy_from_slice(value);
            out.extend_from_slice(&cell);
        }
    }
    out.push(0x1A);
    out
}
