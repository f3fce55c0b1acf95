//! Flat CSV form of the log: `Timestamp,User,Date,<tasks...>,Role,Action`.

use crate::errors::{TrackerError, TrackerResult};
use crate::models::StoredRow;
use crate::records::parse_flag;
use csv::{ReaderBuilder, Writer};
use std::io;

pub fn header(tasks: &[String]) -> Vec<String> {
    let mut columns = vec!["Timestamp".to_string(), "User".to_string(), "Date".to_string()];
    columns.extend(tasks.iter().cloned());
    columns.push("Role".to_string());
    columns.push("Action".to_string());
    columns
}

pub fn write_csv<W: io::Write>(writer: W, tasks: &[String], rows: &[StoredRow]) -> csv::Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(header(tasks))?;

    for row in rows {
        let mut fields = vec![row.timestamp.clone(), row.user.clone(), row.date.clone()];
        fields.extend(
            (0..tasks.len()).map(|i| row.completed.get(i).copied().unwrap_or(false).to_string()),
        );
        fields.push(row.role.clone());
        fields.push(row.action.clone());
        wtr.write_record(&fields)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn export_csv(tasks: &[String], rows: &[StoredRow]) -> TrackerResult<String> {
    let mut buf = Vec::new();
    write_csv(&mut buf, tasks, rows)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Columns are matched by header name, so extra or reordered columns are
/// fine. A task column that is absent reads as all `false`.
pub fn read_csv<R: io::Read>(reader: R, tasks: &[String]) -> TrackerResult<Vec<StoredRow>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);

    let user_col = column("User").ok_or_else(|| TrackerError::validation("missing User column"))?;
    let timestamp_col = column("Timestamp");
    let date_col = column("Date");
    let role_col = column("Role");
    let action_col = column("Action");
    let task_cols: Vec<Option<usize>> = tasks.iter().map(|task| column(task.as_str())).collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let field = |col: Option<usize>| {
            col.and_then(|i| record.get(i))
                .unwrap_or("")
                .trim()
                .to_string()
        };

        rows.push(StoredRow {
            timestamp: field(timestamp_col),
            user: field(Some(user_col)),
            date: field(date_col),
            completed: task_cols
                .iter()
                .map(|col| col.and_then(|i| record.get(i)).is_some_and(parse_flag))
                .collect(),
            role: field(role_col),
            action: field(action_col),
        });
    }

    Ok(rows)
}
