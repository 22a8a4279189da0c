use dtc_report_core::model::{AnalysisResult, DiagnosticReport, InitialError, TodoItem, VehicleInfo};
use dtc_report_core::render::{absolutize_assets, inline_stylesheet, render, strip_scripts};

const TEMPLATE: &str = include_str!("../../templates/Raport-Diagnoza-Auto.html");

fn report() -> DiagnosticReport {
    DiagnosticReport {
        vin: Some("UU1KSDAF123456789".into()),
        make: Some("Dacia".into()),
        ..Default::default()
    }
}

fn error(code: &str, description: &str) -> InitialError {
    InitialError {
        code: code.into(),
        description: description.into(),
        possible_cause: format!("cauza {code}"),
        recommendation: format!("recomandare {code}"),
    }
}

fn analysis(codes: &[&str]) -> AnalysisResult {
    AnalysisResult {
        vehicle: VehicleInfo {
            brand: Some("Dacia".into()),
            model: Some("Logan".into()),
            year: None,
            engine: Some("1.5 dCi".into()),
            mileage: Some("180000 km".into()),
            scan_date: "2024-05-17".into(),
        },
        initial_errors: codes.iter().map(|c| error(c, &format!("descriere {c}"))).collect(),
        conclusion: "Injectorul 2 trebuie verificat.".into(),
        todo: vec![
            TodoItem::new("1", "Test injectoare"),
            TodoItem::new("2", "Sterge codurile"),
        ],
    }
}

#[test]
fn rendering_is_deterministic_and_keeps_record_order() {
    let codes = ["P0201", "P0300", "U0100"];
    let first = render(TEMPLATE, &report(), &analysis(&codes));
    let second = render(TEMPLATE, &report(), &analysis(&codes));
    assert_eq!(first, second);

    assert_eq!(first.matches(r#"<tr class="dtc-row">"#).count(), 3);
    let positions: Vec<usize> = codes
        .iter()
        .map(|c| first.find(&format!(r#"<td class="code">{c}</td>"#)).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(first.matches(r#"<tr class="todo-row">"#).count(), 2);
}

#[test]
fn no_sentinels_or_markers_survive() {
    for codes in [&[][..], &["P0201"][..], &["P0201", "P0300"][..]] {
        let html = render(TEMPLATE, &report(), &analysis(codes));
        assert!(!html.contains("BEGIN:"), "BEGIN left for {codes:?}");
        assert!(!html.contains("END:"), "END left for {codes:?}");
        assert!(!html.contains("__LASTROW__"));
        assert!(!html.contains("{{"), "placeholder left for {codes:?}");
        assert_eq!(
            html.matches("row-sep").count(),
            codes.len().saturating_sub(1),
            "separators for {codes:?}"
        );
    }
}

#[test]
fn header_scalars_are_filled_and_nulls_render_empty() {
    let html = render(TEMPLATE, &report(), &analysis(&["P0201"]));
    assert!(html.contains("<tr><th>VIN</th><td>UU1KSDAF123456789</td></tr>"));
    assert!(html.contains("<tr><th>An</th><td></td></tr>"));
    assert!(html.contains("<tr><th>Motorizare</th><td>1.5 dCi</td></tr>"));
    assert!(html.contains("<p>Injectorul 2 trebuie verificat.</p>"));
}

#[test]
fn record_values_are_escaped_and_never_re_expanded() {
    let mut analysis = analysis(&[]);
    analysis.initial_errors = vec![error("P0420", "Catalizator {{concluzie}} <b>slab</b>")];
    let html = render(TEMPLATE, &report(), &analysis);
    assert!(html.contains("Catalizator {{concluzie}} &lt;b&gt;slab&lt;/b&gt;"));
}

#[test]
fn markup_in_vendor_text_stays_inert() {
    let mut report = report();
    report.vin = Some("<script>alert(1)</script>".into());
    let mut analysis = analysis(&[]);
    analysis.initial_errors = vec![error("P0420", "<script>steal()</script>")];
    let html = render(TEMPLATE, &report, &analysis);
    assert!(!html.contains("<script>alert(1)</script>"));
    assert!(!html.contains("<script>steal()</script>"));
    assert!(html.contains("&lt;script&gt;steal()&lt;/script&gt;"));
}

#[test]
fn email_variant_is_self_contained() {
    let html = render(TEMPLATE, &report(), &analysis(&["P0201"]));
    let html = absolutize_assets(&html, "https://static.example.com/");
    assert!(html.contains(r#"src="https://static.example.com/assets/img/logo.png""#));

    let email = strip_scripts(&inline_stylesheet(&html, ".dtc-row td{padding:4px}"));
    assert!(email.contains("<style>.dtc-row td{padding:4px}</style>"));
    assert!(!email.contains("style.css"));
    assert!(!email.contains("<script"));
}
