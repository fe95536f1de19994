//! Fixed-width plain-text tables.

/// A table of string cells. Column widths fit the widest cell.
///
/// With numbering on, each row gets a leading counter. Set the counter
/// from a previous table's [`Table::next_row_number`] to continue it.
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    numbered: bool,
    first_row_number: usize,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
            numbered: false,
            first_row_number: 1,
        }
    }

    /// Number rows starting at `first`.
    pub fn numbered_from(mut self, first: usize) -> Self {
        self.numbered = true;
        self.first_row_number = first;
        self
    }

    pub fn add_row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn next_row_number(&self) -> usize {
        self.first_row_number + self.rows.len()
    }

    fn numbered_rows(&self) -> (Vec<String>, Vec<Vec<String>>) {
        if !self.numbered {
            return (self.headers.clone(), self.rows.clone());
        }
        let headers = std::iter::once(String::new()).chain(self.headers.iter().cloned()).collect();
        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                std::iter::once(format!("{}.", self.first_row_number + i))
                    .chain(row.iter().cloned())
                    .collect()
            })
            .collect();
        (headers, rows)
    }

    pub fn plain_text(&self) -> String {
        let (headers, rows) = self.numbered_rows();
        let columns = rows.iter().map(Vec::len).chain([headers.len()]).max().unwrap_or(0);
        let mut widths = vec![0; columns];
        for row in std::iter::once(&headers).chain(rows.iter()) {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let separator = format!(
            "+{}+\n",
            widths.iter().map(|w| "-".repeat(w + 2)).collect::<Vec<_>>().join("+")
        );
        let line = |row: &[String]| -> String {
            let cells: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(i, w)| format!(" {:<w$} ", row.get(i).map_or("", String::as_str)))
                .collect();
            format!("|{}|\n", cells.join("|"))
        };

        let mut text = separator.clone();
        text += &line(&headers);
        text += &separator;
        for row in &rows {
            text += &line(row);
        }
        text += &separator;
        text
    }
}
