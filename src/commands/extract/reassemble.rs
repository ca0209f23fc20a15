//! Puts each accepted table back at the position its text occupied on the page.

use super::*;

/// An accepted table parked in the stash, with the texts used to find it in the page stream.
#[derive(Debug, Clone)]
pub(crate) struct PlacedTable {
    pub token: String,
    cell_texts: HashSet<String>,
    full_rows: Vec<String>,
}

impl PlacedTable {
    pub(crate) fn new(rows: &[Vec<Option<String>>], token: String) -> Self {
        let mut cell_texts = HashSet::new();
        let mut full_rows = Vec::new();

        for row in rows {
            let texts = row
                .iter()
                .flatten()
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
                .collect::<Vec<&str>>();

            for text in &texts {
                // multi-line cells are searched line by line
                cell_texts.extend(
                    text.lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(str::to_string),
                );
            }

            if texts.len() > 1 {
                full_rows.push(texts.join(" "));
                full_rows.push(texts.join("\t"));
            }
        }

        Self {
            token,
            cell_texts,
            full_rows,
        }
    }

    fn claims(&self, line: &str, config: &ReassemblyConfig) -> bool {
        let line_tokens = line.split_whitespace().collect::<HashSet<&str>>();
        let long_line = line.chars().count() > config.overlap_min_line_len;

        for row in &self.full_rows {
            if line == row {
                return true;
            }
            if long_line {
                let row_tokens = row.split_whitespace().collect::<HashSet<&str>>();
                let union = line_tokens.union(&row_tokens).count();
                if union > 0 {
                    let shared = line_tokens.intersection(&row_tokens).count();
                    if shared as f64 / union as f64 > config.token_overlap {
                        return true;
                    }
                }
            }
        }

        // short cells such as row numbers also appear as page numbers
        if line.chars().count() > config.cell_min_len && self.cell_texts.contains(line) {
            return true;
        }

        let found = self
            .cell_texts
            .iter()
            .filter(|cell| cell.chars().count() > config.cell_min_len && line.contains(cell.as_str()))
            .collect::<Vec<&String>>();
        match found.as_slice() {
            [] => false,
            [single] => {
                single.chars().count() as f64
                    >= line.chars().count() as f64 * config.single_cell_coverage
            }
            many => many.len() >= config.min_cell_hits,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Reassembled {
    pub lines: Vec<String>,
    /// Tables whose text was not found in the page stream; they are appended at the page end.
    pub unlocated: usize,
}

/// Replaces each table's line span with its placeholder token.
pub(crate) fn reassemble_page(
    lines: &[String],
    tables: &[PlacedTable],
    config: &ReassemblyConfig,
) -> Reassembled {
    if tables.is_empty() {
        return Reassembled {
            lines: collapse_blank_runs(lines.to_vec()),
            unlocated: 0,
        };
    }

    let mut spans: Vec<Option<(usize, usize)>> = vec![None; tables.len()];
    for (index, line) in lines.iter().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        for (table, span) in tables.iter().zip(spans.iter_mut()) {
            if table.claims(line, config) {
                *span = Some(match span {
                    Some((first, _)) => (*first, index),
                    None => (index, index),
                });
            }
        }
    }

    let mut output = Vec::with_capacity(lines.len());
    let mut index = 0;
    while index < lines.len() {
        let starting = tables
            .iter()
            .zip(&spans)
            .find(|(_, span)| matches!(span, Some((first, _)) if *first == index));

        if let Some((table, Some((_, last)))) = starting {
            output.push(table.token.clone());
            index = last + 1;
            continue;
        }

        let inside = spans
            .iter()
            .flatten()
            .any(|(first, last)| *first <= index && index <= *last);
        if !inside {
            output.push(lines[index].clone());
        }
        index += 1;
    }

    let mut unlocated = 0;
    for (table, span) in tables.iter().zip(&spans) {
        if span.is_none() {
            output.push(table.token.clone());
            unlocated += 1;
        }
    }

    Reassembled {
        lines: collapse_blank_runs(output),
        unlocated,
    }
}

/// Runs of three or more blank lines become exactly two.
pub(crate) fn collapse_blank_runs(lines: Vec<String>) -> Vec<String> {
    let mut output = Vec::with_capacity(lines.len());
    let mut blanks = 0;
    for line in lines {
        if line.trim().is_empty() {
            blanks += 1;
            if blanks > 2 {
                continue;
            }
        } else {
            blanks = 0;
        }
        output.push(line);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(raw: &[&[&str]]) -> Vec<Vec<Option<String>>> {
        raw.iter()
            .map(|row| {
                row.iter()
                    .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                    .collect()
            })
            .collect()
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|line| line.to_string()).collect()
    }

    #[test]
    fn table_span_is_replaced_in_place() {
        let table = PlacedTable::new(
            &rows(&[
                &["Clave de tarifa", "Concepto del servicio"],
                &["Domiciliaria", "Abastecimiento residencial"],
                &["Comercial", "Abastecimiento a establecimientos"],
            ]),
            "TABLA_PLACEHOLDER0_".to_string(),
        );
        let page = lines(&[
            "Artículo 8. Las tarifas se aplicarán conforme a lo siguiente:",
            "Clave de tarifa Concepto del servicio",
            "Domiciliaria Abastecimiento residencial",
            "Comercial Abastecimiento a establecimientos",
            "Artículo 9. Los pagos se harán mensualmente.",
        ]);

        let result = reassemble_page(&page, &[table], &ReassemblyConfig::default());
        assert_eq!(result.unlocated, 0);
        assert_eq!(
            result.lines,
            lines(&[
                "Artículo 8. Las tarifas se aplicarán conforme a lo siguiente:",
                "TABLA_PLACEHOLDER0_",
                "Artículo 9. Los pagos se harán mensualmente.",
            ])
        );
    }

    #[test]
    fn cells_split_over_layout_lines_are_claimed() {
        let table = PlacedTable::new(
            &rows(&[
                &["Zona", "Cuota mensual"],
                &["Centro\nhistórico", "150.00"],
                &["Periferia", "95.00"],
            ]),
            "TABLA_PLACEHOLDER3_".to_string(),
        );
        let page = lines(&[
            "Se cobrarán las cuotas siguientes.",
            "Zona      Cuota mensual",
            "Centro    150.00",
            "histórico",
            "Periferia 95.00",
            "",
            "Texto posterior.",
        ]);

        let result = reassemble_page(&page, &[table], &ReassemblyConfig::default());
        assert_eq!(
            result.lines,
            lines(&[
                "Se cobrarán las cuotas siguientes.",
                "TABLA_PLACEHOLDER3_",
                "",
                "Texto posterior.",
            ])
        );
    }

    #[test]
    fn unlocated_tables_go_to_the_page_end() {
        let table = PlacedTable::new(
            &rows(&[&["Nombre", "Cargo"], &["Ana Ruiz", "Vocal"]]),
            "TABLA_PLACEHOLDER1_".to_string(),
        );
        let page = lines(&["Texto sin relación con la tabla."]);
        let result = reassemble_page(&page, &[table], &ReassemblyConfig::default());
        assert_eq!(result.unlocated, 1);
        assert_eq!(result.lines.last().map(String::as_str), Some("TABLA_PLACEHOLDER1_"));
    }

    #[test]
    fn numbered_rows_do_not_reach_the_page_number() {
        let table = PlacedTable::new(
            &rows(&[
                &["No.", "Concepto del servicio"],
                &["1", "Suministro de agua potable"],
                &["2", "Descarga de aguas residuales"],
            ]),
            "TABLA_PLACEHOLDER0_".to_string(),
        );
        let page = lines(&[
            "Artículo 3. Las cuotas son:",
            "No. Concepto del servicio",
            "1 Suministro de agua potable",
            "2 Descarga de aguas residuales",
            "Artículo 4. Las cuotas se actualizan cada año.",
            "Artículo 5. El pago se hace en las oficinas del organismo.",
            "2",
        ]);

        let result = reassemble_page(&page, &[table], &ReassemblyConfig::default());
        assert_eq!(
            result.lines,
            lines(&[
                "Artículo 3. Las cuotas son:",
                "TABLA_PLACEHOLDER0_",
                "Artículo 4. Las cuotas se actualizan cada año.",
                "Artículo 5. El pago se hace en las oficinas del organismo.",
                "2",
            ])
        );
    }

    #[test]
    fn long_blank_runs_collapse_to_two() {
        let collapsed = collapse_blank_runs(lines(&["a", "", "", "", "", "b"]));
        assert_eq!(collapsed, lines(&["a", "", "", "b"]));
    }
}
