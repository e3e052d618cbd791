//! PubMed E-utilities tests against a local mockito server.

use mockito::{Matcher, Server};
use pubmed_harvest::config::{HarvestConfig, RetryConfig};
use pubmed_harvest::harvest::Harvester;
use pubmed_harvest::models::{ArticleRecord, SessionState};
use pubmed_harvest::sources::{PubMedSource, ResultSetSource, SourceError};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const SEARCH_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<!DOCTYPE eSearchResult PUBLIC "-//NLM//DTD esearch 20060628//EN" "https://eutils.ncbi.nlm.nih.gov/eutils/dtd/20060628/esearch.dtd">
<eSearchResult><Count>3</Count><RetMax>0</RetMax><RetStart>0</RetStart><QueryKey>1</QueryKey><WebEnv>MCID_test_env</WebEnv><IdList/></eSearchResult>"#;

const PAGE_ONE_XML: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
<PubmedArticle><MedlineCitation><PMID>11</PMID><Article>
<Journal><JournalIssue><PubDate><Year>2019</Year></PubDate></JournalIssue><Title>Mobile DNA</Title></Journal>
<ArticleTitle>LINE-1 retrotransposition in <i>Drosophila</i></ArticleTitle>
<Abstract><AbstractText>First part.</AbstractText><AbstractText>Second part.</AbstractText></Abstract>
<AuthorList><Author><LastName>Smith</LastName><Initials>JA</Initials></Author><Author><LastName>Doe</LastName><Initials>B</Initials></Author></AuthorList>
<ELocationID EIdType="doi">10.1186/s13100-019-0001</ELocationID>
</Article></MedlineCitation></PubmedArticle>
<PubmedArticle><MedlineCitation><PMID>12</PMID><Article>
<Journal><JournalIssue><PubDate><MedlineDate>1998 Dec-1999 Jan</MedlineDate></PubDate></JournalIssue><Title>Genetica</Title></Journal>
<ArticleTitle>Transposons revisited</ArticleTitle>
</Article></MedlineCitation></PubmedArticle>
</PubmedArticleSet>"#;

const PAGE_TWO_XML: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
<PubmedArticle><MedlineCitation><PMID>13</PMID><Article>
<Journal><JournalIssue><PubDate><Year>2021</Year></PubDate></JournalIssue><Title>Genome Biology</Title></Journal>
<ArticleTitle>Dfam 3.0</ArticleTitle>
<AuthorList><Author><LastName>Storer</LastName><Initials>J</Initials></Author></AuthorList>
</Article></MedlineCitation></PubmedArticle>
</PubmedArticleSet>"#;

fn server_config(base_url: &str, dir: &Path) -> HarvestConfig {
    HarvestConfig {
        email: "lab@example.org".to_string(),
        api_key: None,
        query: "transposon[Title/Abstract]".to_string(),
        page_size: 2,
        output_dir: dir.join("pubmed"),
        checkpoint_path: dir.join("checkpoint.json"),
        batch_pause_ms: 0,
        base_url: base_url.to_string(),
        request_timeout_secs: 5,
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 10,
            backoff_multiplier: 2.0,
        },
        ..HarvestConfig::default()
    }
}

fn fetch_query(retstart: &str) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("db".into(), "pubmed".into()),
        Matcher::UrlEncoded("WebEnv".into(), "MCID_test_env".into()),
        Matcher::UrlEncoded("query_key".into(), "1".into()),
        Matcher::UrlEncoded("retstart".into(), retstart.into()),
        Matcher::UrlEncoded("retmax".into(), "2".into()),
        Matcher::UrlEncoded("rettype".into(), "abstract".into()),
        Matcher::UrlEncoded("retmode".into(), "xml".into()),
    ])
}

#[tokio::test]
async fn test_search_uses_history_server() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/esearch.fcgi")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("db".into(), "pubmed".into()),
            Matcher::UrlEncoded("term".into(), "transposon[Title/Abstract]".into()),
            Matcher::UrlEncoded("usehistory".into(), "y".into()),
            Matcher::UrlEncoded("retmax".into(), "0".into()),
            Matcher::UrlEncoded("email".into(), "lab@example.org".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "text/xml")
        .with_body(SEARCH_XML)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let config = server_config(&server.url(), dir.path());
    let source = PubMedSource::new(&config).unwrap();

    let session = source.search(&config.query).await.unwrap();
    mock.assert_async().await;

    assert_eq!(session.session_handle, "MCID_test_env");
    assert_eq!(session.query_key, "1");
    assert_eq!(session.total_count, 3);
    assert_eq!(session.next_offset, 0);
}

#[tokio::test]
async fn test_search_error_response() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/esearch.fcgi")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<eSearchResult><ERROR>Invalid query</ERROR></eSearchResult>")
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let source = PubMedSource::new(&server_config(&server.url(), dir.path())).unwrap();

    let err = source.search("(((").await.unwrap_err();
    assert!(matches!(err, SourceError::Api(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_fetch_page_maps_bad_request() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/efetch.fcgi")
        .match_query(fetch_query("0"))
        .with_status(400)
        .with_body("{\"error\":\"Unable to obtain query #1\"}")
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let source = PubMedSource::new(&server_config(&server.url(), dir.path())).unwrap();
    let session = SessionState::new("MCID_test_env", "1", 3);

    let err = source.fetch_page(&session, 0, 2).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(err.is_bad_request());
    assert!(err.to_string().contains("400"));
}

#[tokio::test]
async fn test_harvest_against_server() {
    let mut server = Server::new_async().await;
    let search = server
        .mock("GET", "/esearch.fcgi")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(SEARCH_XML)
        .expect(1)
        .create_async()
        .await;
    // Offset 2 is rejected once; mocks with hits still expected win ties
    let flaky = server
        .mock("GET", "/efetch.fcgi")
        .match_query(fetch_query("2"))
        .with_status(400)
        .with_body("Bad Request")
        .expect(1)
        .create_async()
        .await;
    let page_one = server
        .mock("GET", "/efetch.fcgi")
        .match_query(fetch_query("0"))
        .with_status(200)
        .with_body(PAGE_ONE_XML)
        .expect(1)
        .create_async()
        .await;

    let page_two = server
        .mock("GET", "/efetch.fcgi")
        .match_query(fetch_query("2"))
        .with_status(200)
        .with_body(PAGE_TWO_XML)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let config = server_config(&server.url(), dir.path());
    let source = Arc::new(PubMedSource::new(&config).unwrap());
    let harvester = Harvester::new(source, &config).unwrap();

    let summary = harvester.run().await.unwrap();

    search.assert_async().await;
    page_one.assert_async().await;
    flaky.assert_async().await;
    page_two.assert_async().await;

    assert_eq!(summary.batches_written, 2);
    assert_eq!(summary.articles, 3);
    assert_eq!(summary.next_offset, 3);

    let content = std::fs::read_to_string(harvester.writer().chunk_path(0)).unwrap();
    let first: Vec<ArticleRecord> = serde_json::from_str(&content).unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].title, "LINE-1 retrotransposition in Drosophila");
    assert_eq!(first[0].abstract_text, "First part. Second part.");
    assert_eq!(first[0].authors, vec!["Smith JA", "Doe B"]);
    assert_eq!(first[0].first_author, "Smith JA");
    assert_eq!(first[0].doi, "10.1186/s13100-019-0001");
    assert_eq!(first[0].year, "2019");
    assert_eq!(first[1].year, "1998");
    assert_eq!(first[1].first_author, "Unknown");

    let raw: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert!(raw[0].get("abstract").is_some());

    let second = std::fs::read_to_string(harvester.writer().chunk_path(2)).unwrap();
    let second: Vec<ArticleRecord> = serde_json::from_str(&second).unwrap();
    assert_eq!(second[0].journal, "Genome Biology");

    let checkpoint = harvester.checkpoints().load().unwrap().unwrap();
    assert_eq!(checkpoint.next_offset, 3);
    assert_eq!(checkpoint.session_handle, "MCID_test_env");
}
