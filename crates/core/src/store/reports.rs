//! Analysis report storage.
//!
//! Reports are written by the analysis runner and never updated; the first
//! report stored for a record on a given day wins.

use chrono::NaiveDate;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::AnalysisReport;
use crate::Error;
use crate::db::Db;

impl Db {
    /// Store a report and refresh the record's score summary.
    ///
    /// Returns false if a report already existed for that record and day.
    pub async fn store_report(&self, report: &AnalysisReport) -> Result<bool, Error> {
        let report = report.clone();
        let scores_json =
            serde_json::to_string(&report.scores).map_err(|e| Error::InvalidRecord(format!("invalid scores: {e}")))?;

        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO lighthouse_reports
                        (id, pwa_id, absolute_start_url, total_score, scores_json, date)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        &report.id,
                        &report.pwa_id,
                        &report.absolute_start_url,
                        report.total_score,
                        scores_json,
                        report.date.format("%Y-%m-%d").to_string(),
                    ],
                )?;

                if inserted > 0 {
                    tx.execute(
                        "UPDATE pwas SET lighthouse_score = ?2 WHERE id = ?1",
                        params![&report.pwa_id, report.total_score],
                    )?;
                }
                tx.commit()?;

                Ok(inserted > 0)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn latest_report(&self, pwa_id: &str) -> Result<Option<AnalysisReport>, Error> {
        let pwa_id = pwa_id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<AnalysisReport>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, pwa_id, absolute_start_url, total_score, scores_json, date
                    FROM lighthouse_reports WHERE pwa_id = ?1
                    ORDER BY date DESC LIMIT 1",
                )?;

                let result = stmt.query_row(params![pwa_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                });

                let (id, pwa_id, absolute_start_url, total_score, scores_json, date) = match result {
                    Ok(fields) => fields,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                let scores = serde_json::from_str(&scores_json)
                    .map_err(|e| Error::InvalidRecord(format!("report {id} has unreadable scores: {e}")))?;
                let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .map_err(|e| Error::InvalidRecord(format!("report {id} has unreadable date: {e}")))?;

                Ok(Some(AnalysisReport { id, pwa_id, absolute_start_url, total_score, scores, date }))
            })
            .await
            .map_err(Error::from)
    }
}
