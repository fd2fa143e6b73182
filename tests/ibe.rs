use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use firefly_ibe::config::MissionSettings;
use firefly_ibe::download::{
    Destination, Downloader, FileInfo, FileOrigin, HttpDownloader, NoProgress, ProgressSink,
    RequestContext,
};
use firefly_ibe::error::IbeError;
use firefly_ibe::ibe::{Ibe, POS_FILE_FIELD};
use firefly_ibe::info::InfoMap;
use firefly_ibe::missions::twomass::{TwoMassIbeDataSource, TwoMassProduct};
use firefly_ibe::params::{IbeDataParam, IbeQueryParam};
use firefly_ibe::upload::{HttpFileUploader, IbeFileUploader};

#[derive(Default)]
struct MockDownloader {
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl MockDownloader {
    fn urls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }
}

impl Downloader for MockDownloader {
    fn download(
        &self,
        url: &str,
        request: &RequestContext,
        destination: Destination<'_>,
        _sink: &dyn ProgressSink,
    ) -> Result<FileInfo, IbeError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), request.cookie_header()));
        let name = url
            .split('?')
            .next()
            .and_then(|path| path.rsplit('/').next())
            .unwrap_or("download")
            .to_string();
        let path = match destination {
            Destination::File(path) => path.to_owned(),
            Destination::Dir(dir) => dir.join(&name),
        };
        fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
        fs::write(path.as_std_path(), b"remote").unwrap();
        Ok(FileInfo {
            path,
            suggested_name: Some(name),
            response_code: 200,
            origin: FileOrigin::Downloaded,
        })
    }
}

type Posted = (String, String, Utf8PathBuf, Vec<(&'static str, String)>);

#[derive(Clone, Default)]
struct MockUploader {
    posts: Arc<Mutex<Vec<Posted>>>,
}

impl IbeFileUploader for MockUploader {
    fn post(
        &self,
        _results: &Utf8Path,
        file_field: &str,
        file: &Utf8Path,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<u16, IbeError> {
        self.posts.lock().unwrap().push((
            url.to_string(),
            file_field.to_string(),
            file.to_owned(),
            params.to_vec(),
        ));
        Ok(200)
    }
}

fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

fn scan_row() -> InfoMap {
    InfoMap::new()
        .with("ordate", "980623")
        .with("hemisphere", "n")
        .with("scanno", "76")
        .with("fname", "hi0760126.fits.gz")
}

fn twomass(archive: Option<&Utf8Path>) -> Ibe<MockDownloader> {
    let settings = MissionSettings {
        host: None,
        filesystem_basedir: archive.map(Utf8Path::to_owned),
    };
    let source = TwoMassIbeDataSource::new(&settings, TwoMassProduct::Asky);
    Ibe::new(Box::new(source), MockDownloader::default())
}

#[test]
fn local_archive_hit_skips_network() {
    let temp = tempfile::tempdir().unwrap();
    let archive = utf8(temp.path()).join("archive");
    let local = archive.join("980623n/s076/image/hi0760126.fits.gz");
    fs::create_dir_all(local.parent().unwrap().as_std_path()).unwrap();
    fs::write(local.as_std_path(), b"local").unwrap();

    let ibe = twomass(Some(&archive));
    let param = ibe.source().make_data_param(&scan_row()).unwrap();
    let out = utf8(temp.path()).join("out");
    let file = ibe
        .get_data(&param, &RequestContext::new(), &out, &NoProgress)
        .unwrap();

    assert_eq!(file.origin, FileOrigin::Local);
    assert_eq!(file.response_code, 200);
    assert_eq!(file.path, local);
    assert_eq!(file.suggested_name.as_deref(), Some("hi0760126.fits.gz"));
    assert!(ibe.downloader().urls().is_empty());
}

#[test]
fn missing_local_file_falls_back_to_download() {
    let temp = tempfile::tempdir().unwrap();
    let archive = utf8(temp.path()).join("archive");
    fs::create_dir_all(archive.as_std_path()).unwrap();

    let ibe = twomass(Some(&archive));
    let param = ibe.source().make_data_param(&scan_row()).unwrap();
    let out = utf8(temp.path()).join("out");
    let request = RequestContext::new().with_cookie("JSESSIONID", "abc");
    let file = ibe.get_data(&param, &request, &out, &NoProgress).unwrap();

    assert_eq!(file.origin, FileOrigin::Downloaded);
    assert_eq!(file.path, out.join("hi0760126.fits.gz"));
    let calls = ibe.downloader().calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        [(
            "https://irsa.ipac.caltech.edu/ibe/data/twomass/allsky/allsky/980623n/s076/image/hi0760126.fits.gz"
                .to_string(),
            Some("JSESSIONID=abc".to_string())
        )]
    );
}

#[test]
fn cutout_always_downloads() {
    let temp = tempfile::tempdir().unwrap();
    let archive = utf8(temp.path()).join("archive");
    let local = archive.join("980623n/s076/image/hi0760126.fits.gz");
    fs::create_dir_all(local.parent().unwrap().as_std_path()).unwrap();
    fs::write(local.as_std_path(), b"local").unwrap();

    let ibe = twomass(Some(&archive));
    let row = scan_row()
        .with("ra_obj", "10.5")
        .with("dec_obj", "-3.25")
        .with("subsize", "0.05");
    let param = ibe.source().make_data_param(&row).unwrap();
    assert!(param.do_cutout());

    let file = ibe
        .get_data(&param, &RequestContext::new(), &utf8(temp.path()), &NoProgress)
        .unwrap();
    assert_eq!(file.origin, FileOrigin::Downloaded);
    assert_eq!(
        ibe.downloader().urls(),
        ["https://irsa.ipac.caltech.edu/ibe/data/twomass/allsky/allsky/980623n/s076/image/hi0760126.fits.gz?center=10.5,-3.25&size=0.05&gzip=true"]
    );
}

#[test]
fn no_filesystem_root_downloads() {
    let temp = tempfile::tempdir().unwrap();
    let ibe = twomass(None);
    let param = ibe.source().make_data_param(&scan_row()).unwrap();
    let file = ibe
        .get_data(&param, &RequestContext::new(), &utf8(temp.path()), &NoProgress)
        .unwrap();
    assert_eq!(file.origin, FileOrigin::Downloaded);
    assert_eq!(ibe.downloader().urls().len(), 1);
}

#[test]
fn data_without_file_path_fails() {
    let temp = tempfile::tempdir().unwrap();
    let ibe = twomass(Some(&utf8(temp.path())));
    let err = ibe
        .get_data(
            &IbeDataParam::new(),
            &RequestContext::new(),
            &utf8(temp.path()),
            &NoProgress,
        )
        .unwrap_err();
    assert_matches!(err, IbeError::MissingFilePath);
    assert_eq!(err.to_string(), "file path is required to build a data url");
    assert!(ibe.downloader().urls().is_empty());
}

#[test]
fn parent_segments_never_leave_the_archive() {
    let temp = tempfile::tempdir().unwrap();
    let archive = utf8(temp.path()).join("archive");
    fs::create_dir_all(archive.as_std_path()).unwrap();
    fs::write(utf8(temp.path()).join("secret.txt").as_std_path(), b"secret").unwrap();

    let ibe = twomass(Some(&archive));
    let param = IbeDataParam::with_file_path("../secret.txt");
    assert_eq!(ibe.source().local_path(&param), None);

    let err = ibe
        .get_data(&param, &RequestContext::new(), &utf8(temp.path()), &NoProgress)
        .unwrap_err();
    assert_matches!(err, IbeError::InvalidField { field, value } if field == "filePath" && value == "../secret.txt");
    assert!(ibe.downloader().urls().is_empty());
}

#[test]
fn query_and_metadata_urls() {
    let temp = tempfile::tempdir().unwrap();
    let results = utf8(temp.path()).join("results.tbl");
    let ibe = twomass(None);

    ibe.get_metadata(&results, &NoProgress).unwrap();
    let param = IbeQueryParam::with_position("10.5,-3.25", "0.1").unwrap();
    let file = ibe.query(&results, &param, &NoProgress).unwrap();
    assert_eq!(file.path, results);

    assert_eq!(
        ibe.downloader().urls(),
        [
            "https://irsa.ipac.caltech.edu/ibe/search/twomass/allsky/allsky?FORMAT=METADATA",
            "https://irsa.ipac.caltech.edu/ibe/search/twomass/allsky/allsky?POS=10.5,-3.25&INTERSECT=CENTER&mcen",
        ]
    );
}

#[test]
fn unsearchable_query_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let ibe = twomass(None);
    let err = ibe
        .query(
            &utf8(temp.path()).join("r.tbl"),
            &IbeQueryParam::new(),
            &NoProgress,
        )
        .unwrap_err();
    assert_matches!(err, IbeError::InvalidQuery);

    let by_ref = IbeQueryParam::by_reference("3331p015_ab41-000123");
    ibe.query(&utf8(temp.path()).join("r.tbl"), &by_ref, &NoProgress)
        .unwrap();
    assert_eq!(
        ibe.downloader().urls(),
        ["https://irsa.ipac.caltech.edu/ibe/search/twomass/allsky/allsky?refby=3331p015_ab41-000123"]
    );
}

#[test]
fn multiple_queries_need_uploader() {
    let ibe = twomass(None);
    let err = ibe
        .multiple_queries(
            Utf8Path::new("results.tbl"),
            Utf8Path::new("positions.tbl"),
            &IbeQueryParam::new(),
        )
        .unwrap_err();
    assert_matches!(err, IbeError::UploaderUnavailable);
}

#[test]
fn multiple_queries_post_positions_as_file() {
    let uploader = MockUploader::default();
    let ibe = twomass(None).with_uploader(Box::new(uploader.clone()));

    let mut param = IbeQueryParam::with_position("10.5,-3.25", "0.1").unwrap();
    param.set_mcen(false);
    param.set_where("filter='j'");
    let status = ibe
        .multiple_queries(
            Utf8Path::new("results.tbl"),
            Utf8Path::new("positions.tbl"),
            &param,
        )
        .unwrap();
    assert_eq!(status, 200);

    let posts = uploader.posts.lock().unwrap();
    let (url, field, file, fields) = &posts[0];
    assert_eq!(url, "https://irsa.ipac.caltech.edu/ibe/search/twomass/allsky/allsky");
    assert_eq!(field, POS_FILE_FIELD);
    assert_eq!(file.as_str(), "positions.tbl");
    assert_eq!(
        fields,
        &[
            ("INTERSECT", "CENTER".to_string()),
            ("SIZE", "0.1".to_string()),
            ("where", "filter='j'".to_string()),
        ]
    );
    assert!(ibe.downloader().urls().is_empty());
}

/// Serves one response that promises more body than it sends, then hangs up.
fn truncating_server() -> (String, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!(
        "http://{}/ibe/data/twomass/allsky/allsky/hi0760126.fits.gz",
        listener.local_addr().unwrap()
    );
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
            line.clear();
        }
        let mut stream = stream;
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\n0123456789")
            .unwrap();
        stream.flush().unwrap();
    });
    (url, handle)
}

#[test]
fn truncated_body_is_a_remote_error() {
    let temp = tempfile::tempdir().unwrap();
    let dir = utf8(temp.path());
    let (url, server) = truncating_server();

    let downloader = HttpDownloader::with_client(reqwest::blocking::Client::new());
    let err = downloader
        .download(&url, &RequestContext::new(), Destination::Dir(&dir), &NoProgress)
        .unwrap_err();
    server.join().unwrap();

    assert_matches!(&err, IbeError::Body { url: failed, .. } if *failed == url);
    assert!(std::error::Error::source(&err).is_some());
    assert!(!dir.join("hi0760126.fits.gz").as_std_path().exists());
}

/// Accepts one request, hands its raw bytes back and answers with a table.
fn recording_server() -> (String, mpsc::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!(
        "http://{}/ibe/search/twomass/allsky/allsky",
        listener.local_addr().unwrap()
    );
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        while !(request.ends_with(b"--\r\n") || request.ends_with(b"0\r\n\r\n")) {
            let count = stream.read(&mut chunk).unwrap();
            if count == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..count]);
        }
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\n|ra|dec|")
            .unwrap();
        sender.send(request).unwrap();
    });
    (url, receiver)
}

#[test]
fn uploader_streams_position_table() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let positions = root.join("positions.tbl");
    fs::write(positions.as_std_path(), "|ra|dec|\n 10.5 -3.25\n").unwrap();
    let results = root.join("results/batch.tbl");
    let (url, received) = recording_server();

    let uploader = HttpFileUploader::with_client(reqwest::blocking::Client::new());
    let status = uploader
        .post(
            &results,
            POS_FILE_FIELD,
            &positions,
            &url,
            &[("SIZE", "0.1".to_string())],
        )
        .unwrap();
    assert_eq!(status, 200);
    assert_eq!(fs::read_to_string(results.as_std_path()).unwrap(), "|ra|dec|");

    let request = String::from_utf8(received.recv().unwrap()).unwrap();
    assert!(request.starts_with("POST /ibe/search/twomass/allsky/allsky "));
    assert!(request.contains("name=\"SIZE\"\r\n\r\n0.1\r\n"));
    assert!(request.contains("name=\"POS\"; filename=\"positions.tbl\""));
    assert!(request.contains(" 10.5 -3.25\n"));
}
