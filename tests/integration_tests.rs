//! Integration tests for the harvesting loop
//!
//! These drive [`Harvester`] end to end against the scripted [`MockSource`],
//! checking the files written and the checkpoint left behind.

use pubmed_harvest::config::HarvestConfig;
use pubmed_harvest::harvest::{HarvestError, Harvester};
use pubmed_harvest::models::{ArticleRecord, SessionState};
use pubmed_harvest::sources::mock::MOCK_SESSION_HANDLE;
use pubmed_harvest::sources::{MockSource, SourceError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn test_config(dir: &Path) -> HarvestConfig {
    HarvestConfig {
        output_dir: dir.join("pubmed"),
        checkpoint_path: dir.join("checkpoint.json"),
        page_size: 1000,
        batch_pause_ms: 0,
        ..HarvestConfig::default()
    }
}

fn chunk_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn read_chunk(path: PathBuf) -> Vec<ArticleRecord> {
    let content = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[tokio::test]
async fn test_full_run_writes_every_batch() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = Arc::new(MockSource::new(2500));
    let harvester = Harvester::new(source.clone(), &config).unwrap();

    let summary = harvester.run().await.unwrap();

    assert_eq!(summary.batches_written, 3);
    assert_eq!(summary.articles, 2500);
    assert_eq!(summary.next_offset, 2500);
    assert_eq!(summary.total_count, 2500);

    assert_eq!(source.search_calls(), 1);
    assert_eq!(source.fetch_attempts(), vec![0, 1000, 2000]);
    assert_eq!(
        chunk_files(&config.output_dir),
        vec![
            "papers_chunk_0.json",
            "papers_chunk_1000.json",
            "papers_chunk_2000.json"
        ]
    );

    let checkpoint = harvester.checkpoints().load().unwrap().unwrap();
    assert_eq!(checkpoint.next_offset, 2500);
    assert_eq!(checkpoint.total_count, 2500);
    assert_eq!(checkpoint.session_handle, MOCK_SESSION_HANDLE);

    let last = read_chunk(harvester.writer().chunk_path(2000));
    assert_eq!(last.len(), 500);
    assert_eq!(last[0].title, "Article 2000");
    assert_eq!(last[0].first_author, "Author2000 A");
    assert_eq!(last[0].journal, "Mock Journal");
    assert_eq!(last[0].year, "2020");
}

#[tokio::test]
async fn test_resume_skips_completed_offsets() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = Arc::new(MockSource::new(2500));
    let harvester = Harvester::new(source.clone(), &config).unwrap();

    let mut saved = SessionState::new(MOCK_SESSION_HANDLE, "1", 2500);
    saved.advance(1000);
    harvester.checkpoints().save(&saved).unwrap();

    let summary = harvester.run().await.unwrap();

    assert_eq!(source.search_calls(), 0, "resume must not search again");
    assert_eq!(source.fetch_attempts(), vec![1000, 2000]);
    assert!(source.fetch_attempts().iter().all(|&offset| offset >= 1000));
    assert_eq!(summary.batches_written, 2);
    assert_eq!(summary.articles, 1500);
    assert_eq!(
        chunk_files(&config.output_dir),
        vec!["papers_chunk_1000.json", "papers_chunk_2000.json"]
    );
}

#[tokio::test]
async fn test_resume_from_legacy_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    std::fs::write(
        &config.checkpoint_path,
        r#"{"WebEnv": "MCID_mock", "QueryKey": "1", "Count": 1200, "RetStart": 1000}"#,
    )
    .unwrap();

    let source = Arc::new(MockSource::new(1200));
    let harvester = Harvester::new(source.clone(), &config).unwrap();
    harvester.run().await.unwrap();

    assert_eq!(source.fetch_attempts(), vec![1000]);
    let checkpoint = harvester.checkpoints().load().unwrap().unwrap();
    assert_eq!(checkpoint.next_offset, 1200);
}

#[tokio::test]
async fn test_legacy_checkpoint_past_end_is_complete() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    std::fs::write(
        &config.checkpoint_path,
        r#"{"WebEnv": "MCID_mock", "QueryKey": "1", "Count": 2500, "RetStart": 3000}"#,
    )
    .unwrap();

    let source = Arc::new(MockSource::new(2500));
    let harvester = Harvester::new(source.clone(), &config).unwrap();
    let summary = harvester.run().await.unwrap();

    assert_eq!(summary.batches_written, 0);
    assert_eq!(summary.next_offset, 2500);
    assert_eq!(summary.total_count, 2500);
    assert_eq!(source.search_calls(), 0);
    assert!(source.fetch_attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bad_requests_are_retried_with_backoff() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = Arc::new(MockSource::new(500));
    source.fail_with_bad_request(0, 2);
    let harvester = Harvester::new(source.clone(), &config).unwrap();

    let summary = harvester.run().await.unwrap();

    // Two failed attempts then success, waiting 1s and then 2s
    assert_eq!(source.fetch_attempts(), vec![0, 0, 0]);
    let gaps = source.fetch_gaps();
    assert_eq!(gaps.len(), 2);
    for (gap, expected) in gaps.iter().zip([1000u64, 2000]) {
        let expected = Duration::from_millis(expected);
        assert!(*gap >= expected, "gaps {:?}", gaps);
        assert!(*gap < expected + Duration::from_millis(50), "gaps {:?}", gaps);
    }

    assert_eq!(summary.batches_written, 1);
    assert_eq!(chunk_files(&config.output_dir), vec!["papers_chunk_0.json"]);
    assert_eq!(read_chunk(harvester.writer().chunk_path(0)).len(), 500);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_keeps_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = Arc::new(MockSource::new(2500));
    source.fail_with_bad_request(1000, 3);
    let harvester = Harvester::new(source.clone(), &config).unwrap();

    let err = harvester.run().await.unwrap_err();

    match err {
        HarvestError::Source(SourceError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert!(last.is_bad_request());
        }
        other => panic!("Expected RetriesExhausted, got {:?}", other),
    }

    assert_eq!(source.fetch_attempts(), vec![0, 1000, 1000, 1000]);
    let checkpoint = harvester.checkpoints().load().unwrap().unwrap();
    assert_eq!(checkpoint.next_offset, 1000);
    assert_eq!(chunk_files(&config.output_dir), vec!["papers_chunk_0.json"]);

    // A restart picks up where the failed run stopped
    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.batches_written, 2);
    assert_eq!(source.search_calls(), 1);
    assert_eq!(
        harvester.checkpoints().load().unwrap().unwrap().next_offset,
        2500
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_pause_between_batches() {
    let dir = TempDir::new().unwrap();
    let config = HarvestConfig {
        batch_pause_ms: 400,
        ..test_config(dir.path())
    };
    let source = Arc::new(MockSource::new(2500));
    let harvester = Harvester::new(source, &config).unwrap();

    let started = tokio::time::Instant::now();
    harvester.run().await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(1200));
}

#[tokio::test]
async fn test_unparseable_page_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = Arc::new(MockSource::new(10));
    source.push_failure(0, SourceError::Parse("truncated body".to_string()));
    let harvester = Harvester::new(source.clone(), &config).unwrap();

    let err = harvester.run().await.unwrap_err();
    assert!(matches!(err, HarvestError::Source(SourceError::Parse(_))));
    assert_eq!(source.fetch_attempts(), vec![0]);
    assert!(chunk_files(&config.output_dir).is_empty());
}
