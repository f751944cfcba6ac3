use std::{collections::BTreeMap, fmt, time::Duration};

use reqwest::Client;
use tracing::{debug, error};

use crate::error::RadioError;

/// Upper bound for a single call to the radio, connection included.
pub(crate) const TIMEOUT: Duration = Duration::from_secs(10);
/// The firmware addresses stations with a single byte, 255 is never a station.
const MAX_SOURCES: u32 = 254;

/// One answer to the `infos` query, keys exactly as the radio sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Info(BTreeMap<String, String>);

impl Info {
    pub(crate) fn parse(text: &str) -> Result<Self, RadioError> {
        let mut fields = BTreeMap::new();
        for line in text.trim_matches(['\r', '\n']).split('\n') {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| RadioError::Parse(line.to_owned()))?;
            fields.insert(key.trim().to_owned(), value.trim().to_owned());
        }
        Ok(Self(fields))
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Native volume, 0 to 255.
    pub(crate) fn volume(&self) -> Option<u8> {
        self.get("vol")?.parse().ok()
    }

    pub(crate) fn title(&self) -> Option<&str> {
        self.get("tit")
    }

    pub(crate) fn is_playing(&self) -> Option<bool> {
        self.get("sts").map(|status| status != "0")
    }

    /// Index of the current station in the source list.
    pub(crate) fn station(&self) -> Option<usize> {
        self.get("num")?.parse().ok()
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.0 {
            writeln!(f, "{key}: {value}")?;
        }
        Ok(())
    }
}

/// Clamps a volume level to `[0, 1]`, NaN counts as silence.
pub(crate) fn clamp_level(level: f64) -> f64 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

/// Scales to the native 0 to 255 range, ties round to even.
pub(crate) fn volume_to_native(level: f64) -> u8 {
    (255.0 * clamp_level(level)).round_ties_even() as u8
}

/// Client for the plain-text HTTP API of a KaRadio32 unit.
///
/// Every call is a single GET with one query parameter and is never retried.
/// Only [`KaRadio::probe`] and [`KaRadio::version`] report failures, the
/// other calls log them and carry on.
#[derive(Debug, Clone)]
pub(crate) struct KaRadio {
    url: String,
    http: Client,
    timeout: Duration,
}

impl KaRadio {
    pub(crate) fn new(url: &str) -> Self {
        Self::with_client(url, Client::new())
    }

    /// Shares `http` with other clients, the timeout is applied per request.
    pub(crate) fn with_client(url: &str, http: Client) -> Self {
        debug!(url, "initializing radio client");
        Self {
            url: url.trim_end_matches('/').to_owned(),
            http,
            timeout: TIMEOUT,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, key: &str, value: &str) -> Result<String, RadioError> {
        let response = self
            .http
            .get(&self.url)
            .query(&[(key, value)])
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| self.transport_error(err))?;
        response.text().await.map_err(|err| self.transport_error(err))
    }

    fn transport_error(&self, err: reqwest::Error) -> RadioError {
        if err.is_timeout() {
            RadioError::Timeout(self.timeout)
        } else {
            RadioError::Unreachable(err)
        }
    }

    /// Like `request`, but a failure is logged and becomes `None`.
    async fn send(&self, key: &str, value: &str) -> Option<String> {
        match self.request(key, value).await {
            Ok(text) => Some(text),
            Err(err) => {
                error!(url = %self.url, key, value, %err, "radio request failed");
                None
            }
        }
    }

    pub(crate) async fn probe(&self) -> Result<(), RadioError> {
        self.request("version", "").await.map(drop)
    }

    /// `Ok(None)` when the radio could not be reached this time.
    pub(crate) async fn info(&self) -> Result<Option<Info>, RadioError> {
        match self.send("infos", "").await {
            Some(text) => Info::parse(&text).map(Some),
            None => Ok(None),
        }
    }

    /// Walks the station slots from 0 until the first empty one.
    ///
    /// A failed call ends the walk early, the stations read so far are kept.
    pub(crate) async fn source_list(&self) -> Vec<String> {
        let mut sources = Vec::new();
        for index in 0..MAX_SOURCES {
            let Some(name) = self.send("list", &index.to_string()).await else {
                break;
            };
            let name = name.trim();
            if name.is_empty() {
                break;
            }
            sources.push(name.to_owned());
        }
        debug!(count = sources.len(), "listed radio sources");
        sources
    }

    pub(crate) async fn version(&self) -> Result<String, RadioError> {
        Ok(self.request("version", "").await?.trim().to_owned())
    }

    pub(crate) async fn start(&self) {
        self.send("start", "").await;
    }

    pub(crate) async fn stop(&self) {
        self.send("stop", "").await;
    }

    /// Tunes to `station_id`, an index into [`KaRadio::source_list`].
    pub(crate) async fn play(&self, station_id: u32) {
        self.send("play", &station_id.to_string()).await;
    }

    pub(crate) async fn set_volume(&self, level: f64) {
        self.send("volume", &volume_to_native(level).to_string()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockito::{Matcher, Server, ServerGuard};
    use rstest::rstest;
    use tokio::net::TcpListener;

    fn query(key: &str, value: &str) -> Matcher {
        Matcher::UrlEncoded(key.into(), value.into())
    }

    async fn radio() -> (ServerGuard, KaRadio) {
        let server = Server::new_async().await;
        let radio = KaRadio::new(&server.url());
        (server, radio)
    }

    #[test]
    fn parses_info_lines() {
        let info = Info::parse("vol: 128\ntit: Song\nsts: 1\nnum: 2\n").unwrap();
        assert_eq!(info.get("vol"), Some("128"));
        assert_eq!(info.get("tit"), Some("Song"));
        assert_eq!(info.get("sts"), Some("1"));
        assert_eq!(info.get("num"), Some("2"));
        assert_eq!(info.0.len(), 4);
    }

    #[test]
    fn keeps_colons_inside_values() {
        let info = Info::parse("tit: Artist: Song\r\nsts: 0\r\n").unwrap();
        assert_eq!(info.title(), Some("Artist: Song"));
        assert_eq!(info.is_playing(), Some(false));
    }

    #[rstest]
    #[case("vol: 12\nbroken\n", "broken")]
    #[case("", "")]
    #[case("vol: 12\n\nsts: 1", "")]
    fn rejects_lines_without_colon(#[case] text: &str, #[case] offending: &str) {
        match Info::parse(text) {
            Err(RadioError::Parse(line)) => assert_eq!(line, offending),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn absent_or_garbled_fields_are_unknown() {
        let info = Info::parse("vol: loud\nnum: -1\n").unwrap();
        assert_eq!(info.volume(), None);
        assert_eq!(info.station(), None);
        assert_eq!(info.title(), None);
        assert_eq!(info.is_playing(), None);
    }

    #[rstest]
    #[case(0.0, 0)]
    #[case(1.0, 255)]
    #[case(0.5, 128)]
    #[case(0.1, 26)]
    #[case(0.3, 76)]
    #[case(0.7, 178)]
    #[case(-3.0, 0)]
    #[case(7.5, 255)]
    #[case(f64::NEG_INFINITY, 0)]
    #[case(f64::INFINITY, 255)]
    #[case(f64::NAN, 0)]
    fn scales_clamped_volume(#[case] level: f64, #[case] native: u8) {
        assert_eq!(volume_to_native(level), native);
        assert!((0.0..=1.0).contains(&clamp_level(level)));
    }

    #[test]
    fn strips_trailing_slash_from_url() {
        assert_eq!(
            KaRadio::new("http://radio.local/").url(),
            "http://radio.local"
        );
    }

    #[tokio::test]
    async fn info_returns_snapshot() {
        let (mut server, radio) = radio().await;
        let mock = server
            .mock("GET", "/")
            .match_query(query("infos", ""))
            .with_body("vol: 128\ntit: Song\nsts: 1\nnum: 2\n")
            .create_async()
            .await;

        let info = radio.info().await.unwrap().unwrap();
        assert_eq!(info.volume(), Some(128));
        assert_eq!(info.title(), Some("Song"));
        assert_eq!(info.is_playing(), Some(true));
        assert_eq!(info.station(), Some(2));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn info_is_absent_when_request_fails() {
        let (mut server, radio) = radio().await;
        server
            .mock("GET", "/")
            .match_query(query("infos", ""))
            .with_status(500)
            .create_async()
            .await;

        assert_eq!(radio.info().await.unwrap(), None);
    }

    #[tokio::test]
    async fn info_reports_malformed_answer() {
        let (mut server, radio) = radio().await;
        server
            .mock("GET", "/")
            .match_query(query("infos", ""))
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        assert!(matches!(radio.info().await, Err(RadioError::Parse(_))));
    }

    #[tokio::test]
    async fn source_list_stops_at_first_empty_slot() {
        let (mut server, radio) = radio().await;
        let mut mocks = Vec::new();
        let slots = [("0", "A\n", 1), ("1", " B ", 1), ("2", "\n", 1), ("3", "C", 0)];
        for (index, body, hits) in slots {
            mocks.push(
                server
                    .mock("GET", "/")
                    .match_query(query("list", index))
                    .with_body(body)
                    .expect(hits)
                    .create_async()
                    .await,
            );
        }

        assert_eq!(radio.source_list().await, ["A", "B"]);
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn source_list_is_bounded() {
        let (mut server, radio) = radio().await;
        let mock = server
            .mock("GET", "/")
            .match_query(Matcher::Regex(r"^list=\d+$".into()))
            .with_body("Station")
            .expect(254)
            .create_async()
            .await;

        assert_eq!(radio.source_list().await.len(), 254);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn source_list_keeps_stations_read_before_a_failure() {
        let (mut server, radio) = radio().await;
        server
            .mock("GET", "/")
            .match_query(query("list", "0"))
            .with_body("A")
            .create_async()
            .await;
        server
            .mock("GET", "/")
            .match_query(query("list", "1"))
            .with_status(503)
            .create_async()
            .await;

        assert_eq!(radio.source_list().await, ["A"]);
    }

    #[tokio::test]
    async fn version_is_trimmed() {
        let (mut server, radio) = radio().await;
        server
            .mock("GET", "/")
            .match_query(query("version", ""))
            .with_body("Release 2.3\n")
            .create_async()
            .await;

        assert_eq!(radio.version().await.unwrap(), "Release 2.3");
    }

    #[tokio::test]
    async fn commands_send_their_parameter() {
        let (mut server, radio) = radio().await;
        let mut mocks = Vec::new();
        for (key, value) in [("start", ""), ("stop", ""), ("play", "3"), ("volume", "255")] {
            mocks.push(
                server
                    .mock("GET", "/")
                    .match_query(query(key, value))
                    .create_async()
                    .await,
            );
        }

        radio.start().await;
        radio.stop().await;
        radio.play(3).await;
        radio.set_volume(1.7).await;
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn commands_swallow_failures() {
        let (mut server, radio) = radio().await;
        let mock = server
            .mock("GET", "/")
            .match_query(query("stop", ""))
            .with_status(500)
            .create_async()
            .await;

        radio.stop().await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn probe_reports_refused_connection() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let radio = KaRadio::new(&format!("http://{addr}"));
        assert!(matches!(
            radio.probe().await,
            Err(RadioError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn probe_reports_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accepts connections and never answers.
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let radio = KaRadio::new(&format!("http://{addr}"))
            .with_timeout(Duration::from_millis(200));
        assert!(matches!(
            radio.probe().await,
            Err(RadioError::Timeout(timeout)) if timeout == Duration::from_millis(200)
        ));
    }
}
