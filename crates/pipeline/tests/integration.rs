use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook as XlsxWorkbook;
use tempfile::TempDir;

use espelhos_engine::cell::CellValue;
use espelhos_engine::formula::eval::Value;
use espelhos_engine::table::Datum;
use espelhos_io::tabular::load_table;
use espelhos_io::xlsx::{export_workbook, import_workbook};
use espelhos_io::{OutputTarget, Source};
use espelhos_pipeline::summary::{SUMMARY_SHEET, SUMMARY_TOTAL_SHEET};
use espelhos_pipeline::{
    build_mirrors, build_summaries, consolidate_sources, generate_mirrors, generate_summaries, run, MirrorBook,
    PipelineConfig, PipelineError,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const ROSTER_HEADERS: [&str; 7] = ["Nome do Motorista", "Contrato", "CPF", "Banco", "Agência", "Conta", "PIX"];
const SETTLEMENT_HEADERS: [&str; 7] = ["Nome do Motorista", "Cliente", "Romaneio", "Cidade", "Data", "Status", "Custo"];

enum C<'a> {
    S(&'a str),
    N(f64),
}

fn write_xlsx(path: &Path, headers: &[&str], rows: &[Vec<C<'_>>]) {
    let mut wb = XlsxWorkbook::new();
    let ws = wb.add_worksheet();
    for (c, h) in headers.iter().enumerate() {
        ws.write_string(0, c as u16, *h).unwrap();
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            match cell {
                C::S(s) if s.is_empty() => {}
                C::S(s) => {
                    ws.write_string(r as u32 + 1, c as u16, *s).unwrap();
                }
                C::N(n) => {
                    ws.write_number(r as u32 + 1, c as u16, *n).unwrap();
                }
            }
        }
    }
    wb.save(path).unwrap();
}

fn roster_row<'a>(driver: &'a str, contract: &'a str) -> Vec<C<'a>> {
    vec![
        C::S(driver),
        C::S(contract),
        C::S("123.456.789-00"),
        C::S("Itaú"),
        C::S("0001"),
        C::S("12345-6"),
        C::S("chave@pix"),
    ]
}

fn settlement_row<'a>(driver: &'a str, client: &'a str, order: &'a str, city: &'a str, cost: f64) -> Vec<C<'a>> {
    vec![
        C::S(driver),
        C::S(client),
        C::S(order),
        C::S(city),
        C::S("05/01/2024"),
        C::S("OK"),
        C::N(cost),
    ]
}

struct Inputs {
    _dir: TempDir,
    root: PathBuf,
    roster: PathBuf,
    settlement: PathBuf,
    template: PathBuf,
}

impl Inputs {
    fn new(roster: &[Vec<C<'_>>], settlement: &[Vec<C<'_>>]) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let inputs = Inputs {
            roster: root.join("motoristas.xlsx"),
            settlement: root.join("fechamento.xlsx"),
            template: root.join("modelo.xlsx"),
            root,
            _dir: dir,
        };
        write_xlsx(&inputs.roster, &ROSTER_HEADERS, roster);
        write_xlsx(&inputs.settlement, &SETTLEMENT_HEADERS, settlement);

        let mut template = XlsxWorkbook::new();
        let ws = template.add_worksheet();
        ws.set_name("MODELO").unwrap();
        ws.write_string(0, 0, "ESPELHO DE PAGAMENTO").unwrap();
        template.save(&inputs.template).unwrap();
        inputs
    }

    fn out(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn single_driver() -> Inputs {
    Inputs::new(
        &[roster_row("Ana", "C1")],
        &[
            settlement_row("Ana", "X", "R1", "SP", 100.0),
            settlement_row("Ana", "X", "R1", "SP", 100.0),
        ],
    )
}

fn number(v: Value) -> f64 {
    v.as_number().unwrap_or(f64::NAN)
}

// ---------------------------------------------------------------------------
// Stage by stage
// ---------------------------------------------------------------------------

#[test]
fn three_stages_through_files() {
    let inputs = single_driver();
    let config = PipelineConfig::default();

    let banco = inputs.out("banco_consolidado.xlsx");
    let (_, consolidation) = consolidate_sources(
        &Source::path(&inputs.roster),
        &Source::path(&inputs.settlement),
        &config,
        &OutputTarget::path(&banco),
    )
    .unwrap();
    assert_eq!(consolidation.rows, 2);
    assert_eq!(consolidation.matched, 2);

    let table = load_table(&Source::path(&banco)).unwrap();
    let contract = table.column_index("contrato").unwrap();
    assert_eq!(table.get(0, contract), &Datum::text("C1"));

    let espelhos = inputs.out("Espelhos_Motoristas.xlsx");
    let (_, mirrors) = generate_mirrors(
        &Source::path(&banco),
        &Source::path(&inputs.template),
        &config,
        &OutputTarget::path(&espelhos),
    )
    .unwrap();
    assert_eq!(mirrors.entities.len(), 1);
    assert_eq!(mirrors.entities[0].gross, 200.0);

    let final_path = inputs.out("Espelhos_Motoristas_FINAL.xlsx");
    let (_, summary) = generate_summaries(
        &Source::path(&espelhos),
        &Source::path(&banco),
        &config,
        &OutputTarget::path(&final_path),
    )
    .unwrap();
    assert!(summary.anchor_misses.is_empty());
    assert_eq!(summary.entities.len(), 1);
    let ana = &summary.entities[0];
    assert_eq!((ana.driver.as_str(), ana.gross, ana.discount, ana.net), ("Ana", 200.0, 0.0, 200.0));
    assert_eq!(summary.net_total, 200.0);

    let wb = import_workbook(&Source::path(&final_path)).unwrap();
    assert_eq!(wb.sheet_names(), vec!["Ana", SUMMARY_SHEET, SUMMARY_TOTAL_SHEET]);

    let resumo = wb.sheet_by_name(SUMMARY_SHEET).unwrap();
    assert_eq!(resumo.text(5, 0), "Ana");
    assert_eq!(resumo.value(5, 1), &CellValue::Number(200.0));
    assert_eq!(number(wb.evaluate(SUMMARY_SHEET, 5, 2)), 0.0);
    assert_eq!(number(wb.evaluate(SUMMARY_SHEET, 5, 3)), 200.0);

    let total = wb.sheet_by_name(SUMMARY_TOTAL_SHEET).unwrap();
    assert_eq!(total.text(4, 1), "X");
    assert_eq!(number(wb.evaluate(SUMMARY_TOTAL_SHEET, 5, 1)), 200.0);
    assert_eq!(number(wb.evaluate(SUMMARY_TOTAL_SHEET, 5, 2)), 200.0);
}

#[test]
fn run_matches_staged_output() {
    let inputs = single_driver();
    let config = PipelineConfig::default();
    let (artifact, report) = run(
        &Source::path(&inputs.roster),
        &Source::path(&inputs.settlement),
        &Source::path(&inputs.template),
        &config,
        &OutputTarget::Buffer,
    )
    .unwrap();
    assert_eq!(report.consolidation.rows, 2);
    assert_eq!(report.mirrors.entities[0].sheet_name, "Ana");
    assert_eq!(report.summary.net_total, 200.0);

    let wb = import_workbook(&Source::from(artifact)).unwrap();
    assert_eq!(wb.sheet_names(), vec!["Ana", SUMMARY_SHEET, SUMMARY_TOTAL_SHEET]);
    assert!(!wb.sheet(0).unwrap().show_grid_lines);
}

#[test]
fn runs_are_deterministic() {
    let inputs = Inputs::new(
        &[roster_row("Ana Silva", "C1"), roster_row("Bruno Lima", "C2")],
        &[
            settlement_row("Bruno Lima", "Y", "R9", "RJ", 40.0),
            settlement_row("Ana Silva", "X", "R1", "SP", 100.0),
            settlement_row("Ana Silva", "Y", "R2", "RJ", 40.0),
        ],
    );
    let config = PipelineConfig::default();
    let go = || {
        run(
            &Source::path(&inputs.roster),
            &Source::path(&inputs.settlement),
            &Source::path(&inputs.template),
            &config,
            &OutputTarget::Buffer,
        )
        .unwrap()
    };
    let (a, report_a) = go();
    let (b, report_b) = go();
    assert_eq!(report_a, report_b);

    let wa = import_workbook(&Source::from(a)).unwrap();
    let wb = import_workbook(&Source::from(b)).unwrap();
    assert_eq!(wa.sheet_names(), wb.sheet_names());
    assert_eq!(wa.sheet_names()[..2], ["Bruno Lima", "Ana Silva"]);
    for (sa, sb) in wa.sheets().iter().zip(wb.sheets()) {
        let ca: Vec<_> = sa.cells_iter().map(|(k, c)| (*k, c.value.raw_display())).collect();
        let cb: Vec<_> = sb.cells_iter().map(|(k, c)| (*k, c.value.raw_display())).collect();
        assert_eq!(ca, cb, "sheet {}", sa.name);
    }
}

#[test]
fn colliding_sheet_names_are_numbered() {
    let inputs = Inputs::new(
        &[roster_row("Ana Maria Silva", "C1"), roster_row("Ana Maria Souza", "C2")],
        &[
            settlement_row("Ana Maria Silva", "X", "R1", "SP", 10.0),
            settlement_row("Ana Maria Souza", "X", "R2", "SP", 20.0),
        ],
    );
    let (artifact, report) = run(
        &Source::path(&inputs.roster),
        &Source::path(&inputs.settlement),
        &Source::path(&inputs.template),
        &PipelineConfig::default(),
        &OutputTarget::Buffer,
    )
    .unwrap();
    let names: Vec<&str> = report.mirrors.entities.iter().map(|e| e.sheet_name.as_str()).collect();
    assert_eq!(names, vec!["Ana Maria", "Ana Maria 2"]);

    let wb = import_workbook(&Source::from(artifact)).unwrap();
    let resumo = wb.sheet_by_name(SUMMARY_SHEET).unwrap();
    assert_eq!(resumo.text(5, 0), "Ana Maria Silva");
    assert_eq!(resumo.text(6, 0), "Ana Maria Souza");
    assert_eq!(number(wb.evaluate(SUMMARY_SHEET, 7, 3)), 30.0);
}

#[test]
fn discount_entered_on_mirror_flows_to_summaries() {
    let inputs = single_driver();
    let config = PipelineConfig::default();
    let banco = inputs.out("banco.xlsx");
    let espelhos = inputs.out("espelhos.xlsx");
    consolidate_sources(
        &Source::path(&inputs.roster),
        &Source::path(&inputs.settlement),
        &config,
        &OutputTarget::path(&banco),
    )
    .unwrap();
    let (_, mirrors) = generate_mirrors(
        &Source::path(&banco),
        &Source::path(&inputs.template),
        &config,
        &OutputTarget::path(&espelhos),
    )
    .unwrap();
    assert_eq!(mirrors.entities[0].gross, 200.0);

    // An operator types a discount on the first editable line.
    let mut wb = import_workbook(&Source::path(&espelhos)).unwrap();
    let discount_row = (0..60)
        .find(|&r| wb.sheet(0).unwrap().text(r, 0) == "(-) DESCONTOS")
        .unwrap();
    wb.sheet_mut(0)
        .unwrap()
        .set_value(discount_row + 1, 5, CellValue::Number(35.0));
    export_workbook(&wb, &OutputTarget::path(&espelhos)).unwrap();

    let (artifact, summary) = generate_summaries(
        &Source::path(&espelhos),
        &Source::path(&banco),
        &config,
        &OutputTarget::Buffer,
    )
    .unwrap();
    assert_eq!(summary.entities[0].discount, 35.0);
    assert_eq!(summary.entities[0].net, 165.0);
    assert_eq!(summary.net_total, 165.0);

    let wb = import_workbook(&Source::from(artifact)).unwrap();
    let total = wb.sheet_by_name(SUMMARY_TOTAL_SHEET).unwrap();
    // Nome, X, Valor Bruto, Desconto, Valor Líquido
    assert_eq!(total.text(4, 4), "Valor Líquido");
    assert_eq!(number(wb.evaluate(SUMMARY_TOTAL_SHEET, 5, 4)), 165.0);
}

#[test]
fn summaries_replace_previous_summary_sheets() {
    let inputs = single_driver();
    let config = PipelineConfig::default();
    let final_path = inputs.out("final.xlsx");
    run(
        &Source::path(&inputs.roster),
        &Source::path(&inputs.settlement),
        &Source::path(&inputs.template),
        &config,
        &OutputTarget::path(&final_path),
    )
    .unwrap();

    let banco = inputs.out("banco.xlsx");
    consolidate_sources(
        &Source::path(&inputs.roster),
        &Source::path(&inputs.settlement),
        &config,
        &OutputTarget::path(&banco),
    )
    .unwrap();
    let (artifact, summary) = generate_summaries(
        &Source::path(&final_path),
        &Source::path(&banco),
        &config,
        &OutputTarget::Buffer,
    )
    .unwrap();
    assert_eq!(summary.entities.len(), 1);
    let wb = import_workbook(&Source::from(artifact)).unwrap();
    assert_eq!(wb.sheet_names(), vec!["Ana", SUMMARY_SHEET, SUMMARY_TOTAL_SHEET]);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn missing_driver_column_is_reported() {
    let dir = TempDir::new().unwrap();
    let roster = dir.path().join("motoristas.xlsx");
    let settlement = dir.path().join("fechamento.xlsx");
    write_xlsx(&roster, &["Funcionário", "Contrato"], &[vec![C::S("Ana"), C::S("C1")]]);
    write_xlsx(&settlement, &SETTLEMENT_HEADERS, &[settlement_row("Ana", "X", "R1", "SP", 1.0)]);

    let err = consolidate_sources(
        &Source::path(&roster),
        &Source::path(&settlement),
        &PipelineConfig::default(),
        &OutputTarget::Buffer,
    )
    .unwrap_err();
    match &err {
        PipelineError::MissingColumn { field, .. } => assert_eq!(field, "nome do motorista"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("required column missing"));
}

#[test]
fn missing_source_is_reported() {
    let dir = TempDir::new().unwrap();
    let err = consolidate_sources(
        &Source::path(dir.path().join("nope.xlsx")),
        &Source::path(dir.path().join("nada.xlsx")),
        &PipelineConfig::default(),
        &OutputTarget::Buffer,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::SourceNotFound(_)));
}

#[test]
fn unreadable_template_is_a_template_error() {
    let inputs = single_driver();
    let banco = inputs.out("banco.xlsx");
    consolidate_sources(
        &Source::path(&inputs.roster),
        &Source::path(&inputs.settlement),
        &PipelineConfig::default(),
        &OutputTarget::path(&banco),
    )
    .unwrap();
    let bogus = inputs.out("modelo_ruim.xlsx");
    std::fs::write(&bogus, b"PK\x03\x04 not really a workbook").unwrap();
    let err = generate_mirrors(
        &Source::path(&banco),
        &Source::path(&bogus),
        &PipelineConfig::default(),
        &OutputTarget::Buffer,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Template(_)), "got {err}");
}

// ---------------------------------------------------------------------------
// Layout index
// ---------------------------------------------------------------------------

/// Build mirrors in memory, round-trip them through a file, and check the
/// scanned index and both summary sheets against the in-memory ones.
fn assert_scan_matches_builder(roster: &[Vec<C<'_>>], settlement: &[Vec<C<'_>>]) {
    let inputs = Inputs::new(roster, settlement);
    let config = PipelineConfig::default();
    let banco = inputs.out("banco.xlsx");
    consolidate_sources(
        &Source::path(&inputs.roster),
        &Source::path(&inputs.settlement),
        &config,
        &OutputTarget::path(&banco),
    )
    .unwrap();
    let table = load_table(&Source::path(&banco)).unwrap();
    let template = import_workbook(&Source::path(&inputs.template)).unwrap();
    let (built, _) = build_mirrors(&table, template.sheet(0).unwrap(), &config).unwrap();

    let espelhos = inputs.out("espelhos.xlsx");
    export_workbook(&built.workbook, &OutputTarget::path(&espelhos)).unwrap();
    let reloaded = import_workbook(&Source::path(&espelhos)).unwrap();

    let clients = vec!["X".to_string(), "Y".to_string()];
    let cells = config.layout.identity().unwrap();
    let scanned = MirrorBook::from_workbook(reloaded, &clients, &cells);
    assert_eq!(scanned.layouts, built.layouts);

    let (from_memory, _) = build_summaries(built, &clients);
    let (from_disk, _) = build_summaries(scanned, &clients);
    for name in [SUMMARY_SHEET, SUMMARY_TOTAL_SHEET] {
        let a: Vec<_> = from_memory
            .sheet_by_name(name)
            .unwrap()
            .cells_iter()
            .map(|(k, c)| (*k, c.value.raw_display()))
            .collect();
        let b: Vec<_> = from_disk
            .sheet_by_name(name)
            .unwrap()
            .cells_iter()
            .map(|(k, c)| (*k, c.value.raw_display()))
            .collect();
        assert_eq!(a, b, "{name}");
    }
}

#[test]
fn scanned_layouts_match_builder_layouts() {
    assert_scan_matches_builder(
        &[roster_row("Ana Silva", "C1"), roster_row("Bruno Lima", "")],
        &[
            settlement_row("Ana Silva", "X", "R1", "SP", 100.0),
            settlement_row("Ana Silva", "Y", "R2", "RJ", 40.0),
            settlement_row("Ana Silva", "Y", "R3", "Niterói", 40.0),
            settlement_row("Bruno Lima", "Y", "R4", "RJ", 40.0),
        ],
    );
}

#[test]
fn scan_keeps_cities_spelled_like_clients() {
    assert_scan_matches_builder(
        &[roster_row("Ana Silva", "C1")],
        &[
            settlement_row("Ana Silva", "X", "R1", "Y", 100.0),
            settlement_row("Ana Silva", "X", "R2", "Total", 10.0),
            settlement_row("Ana Silva", "Y", "R3", "RJ", 40.0),
        ],
    );
}
