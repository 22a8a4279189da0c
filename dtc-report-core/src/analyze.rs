//! ReportAnalyzer: [`DiagnosticReport`] → [`AnalysisOutcome`].
//!
//! Builds the reasoning-service request, recovers a JSON object from the
//! answer (see [`crate::repair`]), and fills in whatever the service left
//! out. One retry is made on an unusable answer; after that a minimal
//! analysis is synthesized from the raw DTCs. This function never fails.

use chrono::{Local, NaiveDate};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::contract::{ReasoningClient, ReasoningRequest};
use crate::model::{
    AnalysisOutcome, AnalysisResult, DiagnosticReport, InitialError, Provenance, TodoItem,
    VehicleInfo,
};
use crate::repair::{recover_object, RepairError};

/// First call plus one retry.
pub const MAX_ATTEMPTS: u32 = 2;

const SYSTEM_INSTRUCTION: &str = r#"Esti un mecanic auto senior cu experienta in diagnoza electronica.
Raspunzi EXCLUSIV cu un singur obiect JSON strict, fara text in afara lui si fara diacritice.
Schema obligatorie:
{
 "vehicul": {"brand": string|null, "model": string|null, "an": string|null, "motorizare": string|null, "kilometraj": string|null, "data_scanarii": "YYYY-MM-DD"},
 "pas_1_erori_initiale": [{"cod": string, "descriere": string, "cauza_posibila": string, "recomandare": string}],
 "concluzie": string,
 "todo": [{"nr": string, "text": string}]
}
Reguli: 2-4 propozitii pentru fiecare camp text; nu inventa date care lipsesc (foloseste null); fii concis si practic; fara diacritice."#;

const INSTRUCTION: &str = "Analizeaza raportul de diagnoza: pentru fiecare cod DTC da descrierea, cauza posibila si recomandarea. La final da concluzia si lista de pasi de urmat acum.";

const EMPTY_REPORT_CONCLUSION: &str = "Raportul nu contine coduri DTC sau exportul a fost incomplet. Se recomanda o rescanare completa cu tensiune de alimentare stabila si salvarea datelor de freeze frame.";

const EMPTY_REPORT_TODO: [&str; 3] = [
    "Efectueaza un Auto-Scan complet pe toate modulele cu redresorul conectat (12-14.5V).",
    "Daca apar coduri, exporta raportul detaliat cu denumirea modulului, codul, descrierea si freeze frame.",
    "Daca nu apar coduri, verifica alimentarea prizei OBD-II si liniile CAN/K-Line.",
];

const FALLBACK_CONCLUSION: &str = "Analiza automata nu a putut fi validata. Codurile de mai sus sunt preluate direct din raportul scanerului si trebuie interpretate de un tehnician.";

const FALLBACK_TODO: [&str; 3] = [
    "Verifica fiecare cod in documentatia producatorului pentru modulul indicat.",
    "Sterge codurile, efectueaza un drum de test si rescaneaza pentru a vedea care revin.",
    "Programeaza o diagnoza manuala pentru codurile care persista.",
];

const FALLBACK_CAUSE: &str = "Cauza nu a putut fi determinata automat; necesita verificare manuala.";
const FALLBACK_RECOMMENDATION: &str = "Verifica codul in documentatia producatorului si confirma defectul prin masuratori.";

const GENERIC_CONCLUSION: &str = "Analiza nu a inclus o concluzie. Urmeaza pasii de mai jos si reverifica codurile dupa remediere.";

fn numbered(items: &[&str]) -> Vec<TodoItem> {
    items
        .iter()
        .enumerate()
        .map(|(i, text)| TodoItem::new((i + 1).to_string(), *text))
        .collect()
}

/// The todo list used whenever there is nothing to explain.
pub fn empty_report_todo() -> Vec<TodoItem> {
    numbered(&EMPTY_REPORT_TODO)
}

/// Request for one report. `today` goes into the payload as the scan date.
pub fn build_request(report: &DiagnosticReport, today: NaiveDate) -> ReasoningRequest {
    let dtc_list: Vec<Value> = report
        .dtcs
        .iter()
        .map(|d| {
            json!({
                "cod": d.code,
                "modul": d.module,
                "descriere_bruta": d.raw_description,
            })
        })
        .collect();
    let user = json!({
        "instr": INSTRUCTION,
        "meta": {
            "vin": report.vin,
            "brand": report.make,
            "model": report.model,
            "kilometraj": report.mileage,
            "data_scanarii": iso_date(today),
        },
        "dtc_list": dtc_list,
    });
    ReasoningRequest {
        system: SYSTEM_INSTRUCTION.to_string(),
        user: user.to_string(),
    }
}

fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a raw completion into an [`AnalysisResult`], reporting whether
/// repair was needed.
pub fn parse_response(raw: &str) -> Result<(AnalysisResult, bool), RepairError> {
    let recovered = recover_object(raw)?;
    let result = serde_json::from_value(Value::Object(recovered.object))?;
    Ok((result, recovered.repaired))
}

/// Analyze `report` with `client`, using the local date as the scan date.
pub async fn analyze_today<C>(client: &C, report: &DiagnosticReport) -> AnalysisOutcome
where
    C: ReasoningClient + ?Sized,
{
    analyze(client, report, Local::now().date_naive()).await
}

pub async fn analyze<C>(client: &C, report: &DiagnosticReport, today: NaiveDate) -> AnalysisOutcome
where
    C: ReasoningClient + ?Sized,
{
    let request = build_request(report, today);
    debug!(
        dtcs = report.dtcs.len(),
        payload_len = request.user.len(),
        "[ANALYZE] Built reasoning request"
    );

    for attempt in 1..=MAX_ATTEMPTS {
        let raw = match client.complete(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(attempt, error = %e, "[ANALYZE] Reasoning service call failed");
                continue;
            }
        };
        match parse_response(&raw) {
            Ok((result, repaired)) => {
                let provenance = if repaired {
                    Provenance::Repaired
                } else {
                    Provenance::Parsed
                };
                info!(
                    attempt,
                    ?provenance,
                    errors = result.initial_errors.len(),
                    "[ANALYZE] Reasoning response accepted"
                );
                return AnalysisOutcome {
                    result: complete_result(result, report, today),
                    provenance,
                    attempts: attempt,
                };
            }
            Err(e) => {
                warn!(attempt, error = %e, raw_len = raw.len(), "[ANALYZE] Unusable reasoning response");
                debug!(attempt, raw = %raw, "[ANALYZE] Rejected response body");
            }
        }
    }

    warn!(
        dtcs = report.dtcs.len(),
        "[ANALYZE] Falling back to minimal analysis built from raw DTCs"
    );
    AnalysisOutcome {
        result: minimal_fallback(report, today),
        provenance: Provenance::Fallback,
        attempts: MAX_ATTEMPTS,
    }
}

/// Fill gaps in a service answer from the report and apply the
/// empty-errors default.
pub fn complete_result(
    mut result: AnalysisResult,
    report: &DiagnosticReport,
    today: NaiveDate,
) -> AnalysisResult {
    let vehicle = &mut result.vehicle;
    fill(&mut vehicle.brand, &report.make);
    fill(&mut vehicle.model, &report.model);
    fill(&mut vehicle.mileage, &report.mileage);
    if vehicle.scan_date.trim().is_empty() {
        vehicle.scan_date = iso_date(today);
    }

    if result.initial_errors.is_empty() {
        apply_empty_default(&mut result);
    } else {
        if result.conclusion.trim().is_empty() {
            result.conclusion = GENERIC_CONCLUSION.to_string();
        }
        if result.todo.is_empty() {
            result.todo = numbered(&FALLBACK_TODO);
        }
    }
    result
}

fn fill(slot: &mut Option<String>, fallback: &Option<String>) {
    if slot.as_deref().map_or(true, |s| s.trim().is_empty()) {
        *slot = fallback.clone();
    }
}

fn apply_empty_default(result: &mut AnalysisResult) {
    result.conclusion = EMPTY_REPORT_CONCLUSION.to_string();
    result.todo = empty_report_todo();
}

/// Analysis built without the reasoning service.
pub fn minimal_fallback(report: &DiagnosticReport, today: NaiveDate) -> AnalysisResult {
    let initial_errors: Vec<InitialError> = report
        .dtcs
        .iter()
        .map(|d| InitialError {
            code: d.code.clone(),
            description: if d.raw_description.is_empty() {
                d.module.clone()
            } else {
                format!("{}: {}", d.module, d.raw_description)
            },
            possible_cause: FALLBACK_CAUSE.to_string(),
            recommendation: FALLBACK_RECOMMENDATION.to_string(),
        })
        .collect();

    let mut result = AnalysisResult {
        vehicle: VehicleInfo {
            brand: report.make.clone(),
            model: report.model.clone(),
            year: None,
            engine: None,
            mileage: report.mileage.clone(),
            scan_date: iso_date(today),
        },
        initial_errors,
        conclusion: FALLBACK_CONCLUSION.to_string(),
        todo: numbered(&FALLBACK_TODO),
    };
    if result.initial_errors.is_empty() {
        apply_empty_default(&mut result);
    }
    result
}
