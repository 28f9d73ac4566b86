mod common;

use std::{fs, path::Path, sync::Arc};

use bytesize::ByteSize;
use karaoke_core::{MasterIndex, PipelineEvent};
use karaoke_library::{
    GroupingPolicy, IndexReader, LookupError, Pipeline, PipelineError, RunOutcome, SongPayload,
    SourceKind,
};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use common::*;

fn read_master(output: &Path) -> MasterIndex {
    let path = output.join("Data").join("master_index_v6.json");
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

fn batch_size_on_disk(output: &Path, b: usize) -> u64 {
    fs::metadata(output.join(format!("{b}.zip"))).unwrap().len()
}

/// Primera pasada sin agrupar para medir los lotes; devuelve el límite s0 + s1.
async fn measure_limit(input: &Path) -> (u64, Vec<u64>) {
    let scratch = tempdir().unwrap();
    let config = base_config(input, scratch.path())
        .create_zip_files(false)
        .build()
        .unwrap();
    Pipeline::new(config).run().await.unwrap();

    let sizes: Vec<u64> = (0..4).map(|b| batch_size_on_disk(scratch.path(), b)).collect();
    (sizes[0] + sizes[1], sizes)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_songs_pack_into_two_groups() {
    let input = tempdir().unwrap();
    ten_song_collection(input.path());
    let (limit, sizes) = measure_limit(input.path()).await;
    assert!(sizes[2] + sizes[3] <= limit);

    let output = tempdir().unwrap();
    let recorder = Recorder::default();
    let config = base_config(input.path(), output.path())
        .zip_size_limit(ByteSize::b(limit))
        .build()
        .unwrap();
    let outcome = Pipeline::new(config)
        .with_sink(Arc::new(recorder.clone()))
        .run()
        .await
        .unwrap();

    let RunOutcome::Completed(summary) = outcome else {
        panic!("run should complete");
    };
    assert_eq!(summary.songs_discovered, 10);
    assert_eq!(summary.songs_packed, 10);
    assert_eq!(summary.batches, 4);
    assert_eq!(summary.groups.len(), 2);

    let groups = group_archives(output.path());
    assert_eq!(groups.len(), 2);
    assert_eq!(zip_members(&groups[0]), ["0.zip", "1.zip"]);
    assert_eq!(zip_members(&groups[1]), ["2.zip", "3.zip"]);
    for b in 0..4 {
        assert!(!output.path().join(format!("{b}.zip")).exists(), "batch {b} left behind");
    }

    let master = read_master(output.path());
    assert_eq!(master.total_records, 10);
    assert_eq!(master.chunk_count, 1);
    assert_eq!(master.groups[0].batches, vec![0, 1]);
    assert_eq!(master.groups[1].batches, vec![2, 3]);
    assert_eq!(master.batch_location(7).unwrap().archive.as_deref(), Some("karaoke_1.zip"));

    let chunks = read_chunks(output.path());
    assert_eq!(chunks.len(), 1);
    let indexes: Vec<usize> = chunks[0].iter().map(|e| e.original_index).collect();
    assert_eq!(indexes, (0..10).collect::<Vec<_>>());
    assert!(chunks[0].iter().all(|e| e.batch_index == e.original_index / 3));

    let sealed: Vec<usize> = recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            PipelineEvent::GroupSealed { group_index, .. } => Some(group_index),
            _ => None,
        })
        .collect();
    assert_eq!(sealed, [0, 1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn song_missing_cursor_is_skipped_without_consuming_an_index() {
    let input = tempdir().unwrap();
    ten_song_collection(input.path());
    write_ncn(input.path(), "song04b", 900, 500);
    fs::remove_file(input.path().join("song04b.cur")).unwrap();

    let output = tempdir().unwrap();
    let recorder = Recorder::default();
    let config = base_config(input.path(), output.path()).build().unwrap();
    let outcome = Pipeline::new(config)
        .with_sink(Arc::new(recorder.clone()))
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.summary().songs_skipped, 1);
    assert_eq!(outcome.summary().songs_packed, 10);

    let skipped: Vec<String> = recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            PipelineEvent::SongSkipped { label, .. } => Some(label),
            _ => None,
        })
        .collect();
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].contains("song04b"));

    let titles: Vec<String> = read_chunks(output.path())
        .into_iter()
        .flatten()
        .map(|e| e.title)
        .collect();
    assert_eq!(titles.len(), 10);
    assert!(!titles.iter().any(|t| t == "song04b"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn output_does_not_depend_on_worker_count() {
    let input = tempdir().unwrap();
    ten_song_collection(input.path());
    let (limit, _) = measure_limit(input.path()).await;

    let mut runs = Vec::new();
    for workers in [1usize, 4] {
        let output = tempdir().unwrap();
        let config = base_config(input.path(), output.path())
            .workers(workers)
            .zip_size_limit(ByteSize::b(limit))
            .build()
            .unwrap();
        Pipeline::new(config).run().await.unwrap();

        let groups: Vec<Vec<u8>> = group_archives(output.path())
            .iter()
            .map(|p| fs::read(p).unwrap())
            .collect();
        let chunk_dir = output.path().join("Data").join("preview_chunk_v6");
        let chunk = fs::read(chunk_dir.join("0.json")).unwrap();
        runs.push((groups, chunk));
    }

    assert_eq!(runs[0].0.len(), 2);
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn packed_songs_can_be_fetched_back() {
    let input = tempdir().unwrap();
    let first = write_ncn(input.path(), "a_first", 1, 700);
    let second = write_emk(input.path(), "b_second", 2, 900);
    let third = write_ncn(input.path(), "c_third", 3, 400);

    for create_zip_files in [true, false] {
        let output = tempdir().unwrap();
        let config = base_config(input.path(), output.path())
            .batch_size(2usize)
            .create_zip_files(create_zip_files)
            .build()
            .unwrap();
        Pipeline::new(config).run().await.unwrap();

        let reader = IndexReader::open(output.path()).unwrap();
        assert_eq!(reader.fetch_song(0).unwrap(), SongPayload::Ncn(first.clone()));
        assert_eq!(reader.fetch_song(1).unwrap(), SongPayload::Emk(second.clone()));
        assert_eq!(reader.fetch_song(2).unwrap(), SongPayload::Ncn(third.clone()));
        assert!(reader.fetch_song(3).is_err());

        let loose = output.path().join("0.zip").exists();
        assert_eq!(loose, !create_zip_files);
        assert_eq!(group_archives(output.path()).is_empty(), !create_zip_files);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_with_every_song_dropped_has_no_archive_in_the_index() {
    let input = tempdir().unwrap();
    let first = write_emk(input.path(), "a", 1, 300);
    write_emk(input.path(), "b", 2, 300);
    let third = write_emk(input.path(), "c", 3, 300);

    // b.emk desaparece entre la clasificación y el empaquetado
    let vanishing = input.path().join("b.emk");
    let sink = move |event: PipelineEvent| {
        if let PipelineEvent::SongDiscovered { original_index: 1, .. } = event {
            fs::remove_file(&vanishing).unwrap();
        }
    };

    let output = tempdir().unwrap();
    let config = base_config(input.path(), output.path())
        .batch_size(1usize)
        .create_zip_files(false)
        .build()
        .unwrap();
    let outcome = Pipeline::new(config)
        .with_sink(Arc::new(sink))
        .run()
        .await
        .unwrap();
    assert_eq!(outcome.summary().songs_dropped, 1);
    assert!(!output.path().join("1.zip").exists());

    let master = read_master(output.path());
    let empty = master.batch_location(1).unwrap();
    assert_eq!(empty.records, 0);
    assert_eq!(empty.archive, None);
    assert!(!empty.failed);
    for location in &master.batches {
        if let Some(archive) = &location.archive {
            assert!(output.path().join(archive).exists(), "{archive} missing");
        }
    }

    let mut reader = IndexReader::open(output.path()).unwrap();
    assert_eq!(reader.entry(2).unwrap().title, "c");
    assert!(matches!(reader.entry(1), Err(LookupError::UnknownSong(1))));
    assert!(matches!(reader.entry(3), Err(LookupError::UnknownSong(3))));
    assert_eq!(reader.fetch_song(0).unwrap(), SongPayload::Emk(first));
    assert!(matches!(reader.fetch_song(1), Err(LookupError::UnknownSong(1))));
    assert_eq!(reader.fetch_song(2).unwrap(), SongPayload::Emk(third));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn index_archive_bundles_master_and_chunks() {
    let input = tempdir().unwrap();
    ten_song_collection(input.path());
    let output = tempdir().unwrap();
    let config = base_config(input.path(), output.path())
        .chunk_size(4usize)
        .build()
        .unwrap();

    let outcome = Pipeline::new(config).run().await.unwrap();
    let archive = outcome.summary().index_archive.clone().unwrap();
    assert_eq!(archive, output.path().join("index.zip"));
    assert_eq!(outcome.summary().chunk_count, 3);

    let mut members = zip_members(&archive);
    members.sort();
    assert_eq!(
        members,
        [
            "Data/master_index_v6.json",
            "Data/preview_chunk_v6/0.json",
            "Data/preview_chunk_v6/1.json",
            "Data/preview_chunk_v6/2.json",
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelling_after_first_group_keeps_it_and_skips_the_index() {
    let input = tempdir().unwrap();
    ten_song_collection(input.path());
    let (limit, _) = measure_limit(input.path()).await;

    let output = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let sink = move |event: PipelineEvent| {
        if matches!(event, PipelineEvent::GroupSealed { .. }) {
            trigger.cancel();
        }
    };
    let config = base_config(input.path(), output.path())
        .workers(1usize)
        .zip_size_limit(ByteSize::b(limit))
        .build()
        .unwrap();

    let outcome = Pipeline::new(config)
        .with_sink(Arc::new(sink))
        .with_cancellation(cancel)
        .run()
        .await
        .unwrap();

    assert!(outcome.is_cancelled());
    assert_eq!(zip_members(&output.path().join("karaoke_0.zip")), ["0.zip", "1.zip"]);
    assert!(!output.path().join("karaoke_1.zip").exists());
    assert!(!output.path().join("Data/master_index_v6.json").exists());
    assert!(!output.path().join(".karaoke.lock").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_before_start_writes_no_index() {
    let input = tempdir().unwrap();
    ten_song_collection(input.path());
    let output = tempdir().unwrap();
    let config = base_config(input.path(), output.path()).build().unwrap();

    let pipeline = Pipeline::new(config);
    pipeline.cancellation_token().cancel();
    let outcome = pipeline.run().await.unwrap();

    assert!(outcome.is_cancelled());
    assert!(!output.path().join("Data/master_index_v6.json").exists());
    assert!(group_archives(output.path()).is_empty());
}

/// Catálogo con filas NCN, EMK, borradas e incompletas.
fn catalog_fixture(base: &Path) -> (karaoke_library::packing::NcnPayload, Vec<u8>, Vec<u8>) {
    let ncn_root = base.join("Songs/MIDI/NCN");
    let love = write_ncn(&ncn_root.join("Song/A"), "A001", 11, 300);
    // cada parte NCN vive en su carpeta; el cursor sin subcarpeta de letra
    fs::create_dir_all(ncn_root.join("Lyrics/A")).unwrap();
    fs::create_dir_all(ncn_root.join("Cursor")).unwrap();
    fs::rename(ncn_root.join("Song/A/A001.lyr"), ncn_root.join("Lyrics/A/A001.lyr")).unwrap();
    fs::rename(ncn_root.join("Song/A/A001.cur"), ncn_root.join("Cursor/A001.cur")).unwrap();

    let emk_root = base.join("Songs/MIDI/EMK");
    let endless = write_emk(&emk_root.join("B"), "B002", 22, 500);
    let thai = write_emk(&emk_root, "E005", 33, 200);
    write_ncn(&ncn_root.join("Song/D"), "D004", 44, 100);

    let fields = [
        ("CODE", 8),
        ("TITLE", 24),
        ("ARTIST", 24),
        ("TYPE", 6),
        ("SUB_TYPE", 6),
    ];
    let row = |code: &str, title: &[u8], artist: &str, sub: &str| {
        vec![
            code.as_bytes().to_vec(),
            title.to_vec(),
            artist.as_bytes().to_vec(),
            b"MIDI".to_vec(),
            sub.as_bytes().to_vec(),
        ]
    };
    // "สวัสดี" en TIS-620
    let sawasdee: &[u8] = &[0xCA, 0xC7, 0xD1, 0xCA, 0xB4, 0xD5];
    let rows = vec![
        (false, row("A001", b"Love Story", "Band A", "NCN")),
        (false, row("B002", b"Endless Love", "Band B", "EMK")),
        (true, row("C003", b"Deleted", "Nobody", "EMK")),
        (false, row("D004", b"No Cursor", "Band D", "NCN")),
        (false, row("E005", sawasdee, "Love Band", "EMK")),
    ];
    fs::create_dir_all(base.join("Data")).unwrap();
    fs::write(base.join("Data/SONG.DBF"), build_dbf(&fields, &rows)).unwrap();

    (love, endless, thai)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn catalog_source_packs_table_rows_in_order() {
    let input = tempdir().unwrap();
    let (love, endless, thai) = catalog_fixture(input.path());
    let output = tempdir().unwrap();
    let config = base_config(input.path(), output.path())
        .source(SourceKind::Catalog)
        .build()
        .unwrap();

    let outcome = Pipeline::new(config).run().await.unwrap();
    assert_eq!(outcome.summary().songs_discovered, 3);
    assert_eq!(outcome.summary().songs_skipped, 1);

    let entries: Vec<(String, String, usize)> = read_chunks(output.path())
        .into_iter()
        .flatten()
        .map(|e| (e.title, e.artist, e.original_index))
        .collect();
    assert_eq!(
        entries,
        [
            ("Love Story".to_string(), "Band A".to_string(), 0),
            ("Endless Love".to_string(), "Band B".to_string(), 1),
            ("สวัสดี".to_string(), "Love Band".to_string(), 2),
        ]
    );

    let reader = IndexReader::open(output.path()).unwrap();
    assert_eq!(reader.fetch_song(0).unwrap(), SongPayload::Ncn(love));
    assert_eq!(reader.fetch_song(1).unwrap(), SongPayload::Emk(endless));
    assert_eq!(reader.fetch_song(2).unwrap(), SongPayload::Emk(thai));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn search_ranks_hits_over_the_built_index() {
    let input = tempdir().unwrap();
    catalog_fixture(input.path());
    let output = tempdir().unwrap();
    let config = base_config(input.path(), output.path())
        .chunk_size(2usize)
        .grouping_policy(GroupingPolicy::SealAfterAdd)
        .build()
        .unwrap();
    Pipeline::new(config).run().await.unwrap();

    let mut reader = IndexReader::open(output.path()).unwrap();
    let hits: Vec<(usize, u8)> = reader
        .search("Love", 50)
        .unwrap()
        .into_iter()
        .map(|h| (h.entry.original_index, h.score))
        .collect();
    assert_eq!(hits, [(0, 2), (1, 3), (2, 4)]);

    let thai = reader.search("สวัสดี", 50).unwrap();
    assert_eq!(thai.len(), 1);
    assert_eq!(thai[0].score, 1);

    assert_eq!(reader.search("love", 1).unwrap().len(), 1);
    assert!(reader.search("zz", 50).unwrap().is_empty());
    assert!(reader.search("l", 50).is_err());
}

#[tokio::test]
async fn invalid_configuration_fails_before_touching_output() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    let target = output.path().join("out");
    let config = base_config(input.path(), &target)
        .batch_size(0usize)
        .build()
        .unwrap();

    let err = Pipeline::new(config).run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
    assert!(!target.exists());
}
