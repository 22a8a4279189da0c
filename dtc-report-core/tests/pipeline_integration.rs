use std::path::PathBuf;

use dtc_report_core::config::{PipelineConfig, TemplateConfig};
use dtc_report_core::contract::{FetchError, MockPageFetcher, MockReasoningClient};
use dtc_report_core::model::Provenance;
use dtc_report_core::pipeline::{process_email_body, process_report_url, PipelineError};
use dtc_report_core::strategy::StrategyKind;

const REPORT_URL: &str = "https://mydiag.topdon.com/share/report?id=42&lang=ro";
const TEMPLATE_URL: &str = "https://static.example.com/Raport-Diagnoza-Auto.html";
const CSS_URL: &str = "https://static.example.com/assets/css/style.css";

const REPORT_PAGE: &str = "<html><body>\
    <p>VIN: UU1KSDAF123456789</p><p>Make: Dacia</p><p>Mileage: 184,200 km</p>\
    <p>ENGINE 2B1C Injector circuit cylinder 2 Current</p>\
    <p>ABS 5E10 Wheel speed sensor front left History</p>\
    </body></html>";

const ANSWER: &str = r#"{
  "vehicul": {"brand": "Dacia", "model": "Logan", "an": "2016", "motorizare": "1.5 dCi", "kilometraj": "184200 km", "data_scanarii": "2024-05-17"},
  "pas_1_erori_initiale": [
    {"cod": "2B1C", "descriere": "Circuit injector 2", "cauza_posibila": "Conector oxidat", "recomandare": "Verifica cablajul"},
    {"cod": "5E10", "descriere": "Senzor ABS fata stanga", "cauza_posibila": "Senzor murdar", "recomandare": "Curata senzorul"}
  ],
  "concluzie": "Doua defecte electrice minore.",
  "todo": [{"nr": "1", "text": "Verifica cablajul injectorului"}]
}"#;

fn shipped_template() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../templates/Raport-Diagnoza-Auto.html")
}

fn config() -> PipelineConfig {
    PipelineConfig {
        template: TemplateConfig {
            url: Some(TEMPLATE_URL.into()),
            path: shipped_template(),
            assets_base_url: Some("https://static.example.com".into()),
            inline_css: true,
            css_url: None,
        },
        ..Default::default()
    }
}

fn site_fetcher() -> MockPageFetcher {
    let mut fetcher = MockPageFetcher::new();
    fetcher.expect_fetch_text().returning(|url: &str| match url {
        REPORT_URL => Ok(REPORT_PAGE.to_string()),
        CSS_URL => Ok("body{font-family:sans-serif}".to_string()),
        other => Err(FetchError::Status {
            status: 404,
            url: other.to_string(),
        }),
    });
    fetcher
}

fn answering_client() -> MockReasoningClient {
    let mut client = MockReasoningClient::new();
    client
        .expect_complete()
        .times(1)
        .returning(|_| Ok(ANSWER.to_string()));
    client
}

#[tokio::test]
async fn mail_without_link_is_rejected_before_any_io() {
    let mut fetcher = MockPageFetcher::new();
    fetcher.expect_fetch_text().times(0);
    let mut client = MockReasoningClient::new();
    client.expect_complete().times(0);

    let result = process_email_body(
        &config(),
        &fetcher,
        &client,
        "Buna ziua, raportul va fi trimis separat.",
    )
    .await;
    assert!(matches!(result, Err(PipelineError::NoLink)));
}

#[tokio::test]
async fn missing_report_page_is_a_fetch_error() {
    let mut client = MockReasoningClient::new();
    client.expect_complete().times(0);

    let result = process_report_url(
        &config(),
        &site_fetcher(),
        &client,
        "https://mydiag.topdon.com/share/report?id=gone",
    )
    .await;
    match result {
        Err(PipelineError::Fetch(FetchError::Status { status, .. })) => assert_eq!(status, 404),
        other => panic!("expected fetch error, got {other:?}"),
    }
}

#[tokio::test]
async fn mail_run_renders_report_and_email_variant() {
    let body = format!(
        "<p>Raportul de diagnoza este gata: <a href=\"{}\">deschide</a></p>",
        REPORT_URL.replace('&', "&amp;")
    );

    let rendered = process_email_body(&config(), &site_fetcher(), &answering_client(), &body)
        .await
        .expect("pipeline should succeed");

    assert_eq!(rendered.file_name, "Raport_UU1KSDAF123456789.html");
    assert_eq!(rendered.report.url, REPORT_URL);
    assert_eq!(rendered.strategy, Some(StrategyKind::StructuredLine));
    assert_eq!(rendered.report.dtcs.len(), 2);
    assert_eq!(rendered.analysis.provenance, Provenance::Parsed);

    let html = &rendered.html;
    assert_eq!(html.matches(r#"<tr class="dtc-row">"#).count(), 2);
    assert!(html.contains("Circuit injector 2"));
    assert!(html.contains("Doua defecte electrice minore."));
    assert!(html.contains(r#"src="https://static.example.com/assets/img/logo.png""#));
    assert!(html.contains("<script"));

    let email = rendered.email_html.as_deref().expect("email variant");
    assert!(email.contains("<style>body{font-family:sans-serif}</style>"));
    assert!(!email.contains("<script"));
}

#[tokio::test]
async fn url_run_has_no_email_variant() {
    let rendered = process_report_url(&config(), &site_fetcher(), &answering_client(), REPORT_URL)
        .await
        .unwrap();
    assert!(rendered.email_html.is_none());
    assert!(rendered.html.contains("Senzor ABS fata stanga"));
}

#[tokio::test]
async fn unavailable_template_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.template.path = dir.path().join("missing.html");

    let result =
        process_report_url(&config, &site_fetcher(), &answering_client(), REPORT_URL).await;
    match result {
        Err(PipelineError::Template(message)) => assert!(message.contains("missing.html")),
        other => panic!("expected template error, got {other:?}"),
    }
}
