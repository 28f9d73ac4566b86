use std::{fs, process::ExitCode};

use anyhow::{Context, Result};
use karaoke_library::{IndexReader, SongPayload};
use karaoke_paths::fs_utils;
use serde::Serialize;
use tracing::info;

use crate::{ExtractArgs, SearchArgs};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HitRow<'a> {
    title: &'a str,
    artist: &'a str,
    original_index: usize,
    batch_index: usize,
    priority: u8,
}

pub fn search(args: SearchArgs) -> Result<ExitCode> {
    let mut reader = IndexReader::open(&args.output)
        .with_context(|| format!("opening index in {}", args.output.display()))?;
    let query = args.query.join(" ");
    let hits = reader.search(&query, args.max_results)?;

    if args.json {
        let rows: Vec<HitRow> = hits
            .iter()
            .map(|h| HitRow {
                title: &h.entry.title,
                artist: &h.entry.artist,
                original_index: h.entry.original_index,
                batch_index: h.entry.batch_index,
                priority: h.score,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for hit in &hits {
            println!(
                "{:>7}  {}  {} - {}",
                hit.entry.original_index, hit.score, hit.entry.title, hit.entry.artist
            );
        }
        eprintln!("{} results", hits.len());
    }

    Ok(if hits.is_empty() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

pub fn extract(args: ExtractArgs) -> Result<ExitCode> {
    let mut reader = IndexReader::open(&args.output)
        .with_context(|| format!("opening index in {}", args.output.display()))?;
    let entry = reader.entry(args.index)?;
    let song = reader.fetch_song(args.index)?;
    info!(title = %entry.title, artist = %entry.artist, kind = %song.kind(), "extracting song");

    fs_utils::ensure_dir(&args.dest)?;
    let i = args.index;
    let files: Vec<(String, Vec<u8>)> = match song {
        SongPayload::Ncn(p) => vec![
            (format!("{i}.mid"), p.mid),
            (format!("{i}.lyr"), p.lyr),
            (format!("{i}.cur"), p.cur),
        ],
        SongPayload::Emk(bytes) => vec![(format!("{i}.emk"), bytes)],
    };

    for (name, bytes) in files {
        let path = args.dest.join(&name);
        fs::write(&path, &bytes).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), bytes = bytes.len(), "song file extracted");
    }
    Ok(ExitCode::SUCCESS)
}
