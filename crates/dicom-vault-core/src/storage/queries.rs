use super::models::*;
use super::sqlite::Database;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result, Row, ToSql};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

const SERIES_COLUMNS: &str = "id, patient_id, patient_name, patient_sex, patient_birth_date, \
     study_instance_uid, study_date, series_instance_uid, series_number, series_description, \
     modality, protocol_name, manufacturer, manufacturer_model, ct_params, mr_params, dx_params, \
     file_path, file_count, file_size_total, file_modified_date, scan_id, is_active, created_at";

const SCAN_RUN_COLUMNS: &str = "id, scan_path, trigger_kind, started_at, finished_at, files_found, \
     series_found, series_new, series_duplicated, series_rejected, series_failed, status, error";

const SCAN_CONFIG_COLUMNS: &str =
    "id, scan_path, description, is_active, schedule_type, recursive, last_scan_at, created_at";

const FILTER_RULE_COLUMNS: &str =
    "id, modality, max_slice_thickness, min_image_count, is_active, created_at";

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Database {
    // ── Scan Configs ─────────────────────────────────────────────

    pub fn create_scan_config(
        &self,
        scan_path: &str,
        description: Option<&str>,
        schedule_type: ScheduleKind,
        recursive: bool,
    ) -> Result<i64> {
        self.connection().execute(
            "INSERT INTO scan_config (scan_path, description, schedule_type, recursive, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![scan_path, description, schedule_type, recursive, now()],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn get_scan_config(&self, id: i64) -> Result<Option<ScanConfig>> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM scan_config WHERE id = ?1", SCAN_CONFIG_COLUMNS),
                params![id],
                scan_config_from_row,
            )
            .optional()
    }

    pub fn list_scan_configs(&self) -> Result<Vec<ScanConfig>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM scan_config ORDER BY created_at DESC, id DESC",
            SCAN_CONFIG_COLUMNS
        ))?;
        let configs = stmt
            .query_map([], scan_config_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(configs)
    }

    /// Returns false when no configuration has this id.
    pub fn update_scan_config(
        &self,
        id: i64,
        scan_path: &str,
        description: Option<&str>,
        schedule_type: ScheduleKind,
        recursive: bool,
    ) -> Result<bool> {
        let changed = self.connection().execute(
            "UPDATE scan_config SET scan_path = ?1, description = ?2, schedule_type = ?3, \
             recursive = ?4 WHERE id = ?5",
            params![scan_path, description, schedule_type, recursive, id],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_scan_config(&self, id: i64) -> Result<bool> {
        let changed = self
            .connection()
            .execute("DELETE FROM scan_config WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn touch_scan_config(&self, id: i64) -> Result<()> {
        self.connection().execute(
            "UPDATE scan_config SET last_scan_at = ?1 WHERE id = ?2",
            params![now(), id],
        )?;
        Ok(())
    }

    // ── Scan Runs ────────────────────────────────────────────────

    pub fn create_scan_run(&self, id: &str, scan_path: &str, trigger: ScheduleKind) -> Result<()> {
        self.connection().execute(
            "INSERT INTO scan_run (id, scan_path, trigger_kind, started_at, status) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, scan_path, trigger, now(), ScanStatus::Running],
        )?;
        Ok(())
    }

    pub fn finish_scan_run(&self, id: &str, counts: &ScanCounts) -> Result<()> {
        self.finalize_scan_run(id, counts, ScanStatus::Completed, None)
    }

    pub fn fail_scan_run(&self, id: &str, counts: &ScanCounts, error: &str) -> Result<()> {
        self.finalize_scan_run(id, counts, ScanStatus::Failed, Some(error))
    }

    fn finalize_scan_run(
        &self,
        id: &str,
        counts: &ScanCounts,
        status: ScanStatus,
        error: Option<&str>,
    ) -> Result<()> {
        self.connection().execute(
            "UPDATE scan_run SET finished_at = ?1, status = ?2, error = ?3, files_found = ?4, \
             series_found = ?5, series_new = ?6, series_duplicated = ?7, series_rejected = ?8, \
             series_failed = ?9 WHERE id = ?10 AND status = 'running'",
            params![
                now(),
                status,
                error,
                counts.files_found,
                counts.series_found,
                counts.series_new,
                counts.series_duplicated,
                counts.series_rejected,
                counts.series_failed,
                id
            ],
        )?;
        Ok(())
    }

    pub fn get_scan_run(&self, id: &str) -> Result<Option<ScanRun>> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM scan_run WHERE id = ?1", SCAN_RUN_COLUMNS),
                params![id],
                scan_run_from_row,
            )
            .optional()
    }

    /// Newest first. Returns (runs, total_run_count).
    pub fn list_scan_runs(&self, offset: i64, limit: i64) -> Result<(Vec<ScanRun>, i64)> {
        let total: i64 = self
            .connection()
            .query_row("SELECT COUNT(*) FROM scan_run", [], |row| row.get(0))?;

        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM scan_run ORDER BY started_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
            SCAN_RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map(params![limit, offset], scan_run_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok((runs, total))
    }

    // ── Filter Rules ─────────────────────────────────────────────

    /// One rule per modality: an existing rule is updated in place.
    pub fn upsert_filter_rule(
        &self,
        modality: &str,
        max_slice_thickness: Option<f64>,
        min_image_count: Option<i64>,
    ) -> Result<FilterRule> {
        self.connection().execute(
            "INSERT INTO filter_rule (modality, max_slice_thickness, min_image_count, created_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(modality) DO UPDATE SET \
                 max_slice_thickness = excluded.max_slice_thickness, \
                 min_image_count = excluded.min_image_count",
            params![modality, max_slice_thickness, min_image_count, now()],
        )?;
        self.connection().query_row(
            &format!("SELECT {} FROM filter_rule WHERE modality = ?1", FILTER_RULE_COLUMNS),
            params![modality],
            filter_rule_from_row,
        )
    }

    pub fn list_filter_rules(&self) -> Result<Vec<FilterRule>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM filter_rule ORDER BY modality",
            FILTER_RULE_COLUMNS
        ))?;
        let rules = stmt
            .query_map([], filter_rule_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(rules)
    }

    pub fn active_filter_rules(&self) -> Result<Vec<FilterRule>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM filter_rule WHERE is_active = 1 ORDER BY modality",
            FILTER_RULE_COLUMNS
        ))?;
        let rules = stmt
            .query_map([], filter_rule_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(rules)
    }

    pub fn set_filter_rule_active(&self, id: i64, active: bool) -> Result<bool> {
        let changed = self.connection().execute(
            "UPDATE filter_rule SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_filter_rule(&self, id: i64) -> Result<bool> {
        let changed = self
            .connection()
            .execute("DELETE FROM filter_rule WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // ── Series ───────────────────────────────────────────────────

    pub fn get_series(&self, id: &str) -> Result<Option<SeriesRecord>> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM series WHERE id = ?1", SERIES_COLUMNS),
                params![id],
                series_from_row,
            )
            .optional()
    }

    /// Lookup by the true identity key.
    pub fn get_series_by_uid(&self, series_uid: &str) -> Result<Option<SeriesRecord>> {
        self.connection()
            .query_row(
                &format!(
                    "SELECT {} FROM series WHERE series_instance_uid = ?1",
                    SERIES_COLUMNS
                ),
                params![series_uid],
                series_from_row,
            )
            .optional()
    }

    pub fn insert_series(&self, record: &SeriesRecord) -> Result<()> {
        insert_series_row(self.connection(), record)
    }

    /// Each entry is (series_id, file_path).
    pub fn append_series_paths(&self, entries: &[(String, String)]) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let count = insert_series_path_rows(&tx, entries)?;
        tx.commit()?;
        Ok(count)
    }

    /// Write one scan's new series and path fan-out atomically.
    pub fn commit_ingest(
        &self,
        new_series: &[SeriesRecord],
        appended_paths: &[(String, String)],
    ) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        for record in new_series {
            insert_series_row(&tx, record)?;
        }
        let paths = insert_series_path_rows(&tx, appended_paths)?;
        tx.commit()?;
        debug!(
            "Committed {} new series and {} series paths",
            new_series.len(),
            paths
        );
        Ok(())
    }

    /// Fan-out paths of a series in discovery order.
    pub fn series_paths(&self, series_id: &str) -> Result<Vec<SeriesPathRecord>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, series_id, file_path, added_at FROM series_path \
             WHERE series_id = ?1 ORDER BY id",
        )?;
        let paths = stmt
            .query_map(params![series_id], |row| {
                Ok(SeriesPathRecord {
                    id: row.get(0)?,
                    series_id: row.get(1)?,
                    file_path: row.get(2)?,
                    added_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(paths)
    }

    /// Newest first.
    pub fn list_series(
        &self,
        query: &SeriesQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<SeriesRecord>> {
        let (where_clause, mut values) = series_where(query);
        values.push(Box::new(limit));
        values.push(Box::new(offset));
        let sql = format!(
            "SELECT {} FROM series {} ORDER BY created_at DESC, rowid DESC LIMIT ?{} OFFSET ?{}",
            SERIES_COLUMNS,
            where_clause,
            values.len() - 1,
            values.len()
        );
        let mut stmt = self.connection().prepare(&sql)?;
        let series = stmt
            .query_map(params_from_iter(values.iter()), series_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(series)
    }

    pub fn count_series(&self, query: &SeriesQuery) -> Result<i64> {
        let (where_clause, values) = series_where(query);
        self.connection().query_row(
            &format!("SELECT COUNT(*) FROM series {}", where_clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )
    }

    /// Clears the active flag. The row and its paths stay.
    pub fn soft_delete_series(&self, id: &str) -> Result<bool> {
        let changed = self.connection().execute(
            "UPDATE series SET is_active = 0 WHERE id = ?1",
            params![id],
        )?;
        Ok(changed > 0)
    }

    // ── Statistics ───────────────────────────────────────────────

    pub fn modality_stats(&self) -> Result<Vec<ModalityCount>> {
        let mut stmt = self.connection().prepare(
            "SELECT modality, COUNT(*) FROM series WHERE is_active = 1 \
             GROUP BY modality ORDER BY COUNT(*) DESC, modality",
        )?;
        let stats = stmt
            .query_map([], |row| {
                Ok(ModalityCount {
                    modality: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(stats)
    }

    /// Active series per study date, newest dates first.
    pub fn study_date_stats(&self, limit: i64) -> Result<Vec<DateCount>> {
        let mut stmt = self.connection().prepare(
            "SELECT study_date, COUNT(*) FROM series \
             WHERE is_active = 1 AND study_date IS NOT NULL \
             GROUP BY study_date ORDER BY study_date DESC LIMIT ?1",
        )?;
        let stats = stmt
            .query_map(params![limit], |row| {
                Ok(DateCount {
                    date: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(stats)
    }
}

fn series_where(query: &SeriesQuery) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if !query.include_inactive {
        clauses.push("is_active = 1".to_string());
    }

    let substring_filters = [
        ("patient_id", &query.patient_id),
        ("patient_name", &query.patient_name),
        ("protocol_name", &query.protocol_name),
    ];
    for (column, value) in substring_filters {
        if let Some(v) = value.as_ref().filter(|v| !v.is_empty()) {
            values.push(Box::new(v.clone()));
            clauses.push(format!("instr({}, ?{}) > 0", column, values.len()));
        }
    }

    if let Some(modality) = query.modality.as_ref().filter(|v| !v.is_empty()) {
        values.push(Box::new(modality.clone()));
        clauses.push(format!("modality = ?{}", values.len()));
    }
    if let Some(from) = query.study_date_from.as_ref().filter(|v| !v.is_empty()) {
        values.push(Box::new(from.clone()));
        clauses.push(format!("study_date >= ?{}", values.len()));
    }
    if let Some(to) = query.study_date_to.as_ref().filter(|v| !v.is_empty()) {
        values.push(Box::new(to.clone()));
        clauses.push(format!("study_date <= ?{}", values.len()));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), values)
    }
}

fn insert_series_row(conn: &Connection, record: &SeriesRecord) -> Result<()> {
    let mut stmt = conn.prepare_cached(&format!(
        "INSERT INTO series ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, \
         ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
        SERIES_COLUMNS
    ))?;
    stmt.execute(params![
        record.id,
        record.patient_id,
        record.patient_name,
        record.patient_sex,
        record.patient_birth_date,
        record.study_instance_uid,
        record.study_date,
        record.series_instance_uid,
        record.series_number,
        record.series_description,
        record.modality,
        record.protocol_name,
        record.manufacturer,
        record.manufacturer_model,
        to_json(&record.ct_params)?,
        to_json(&record.mr_params)?,
        to_json(&record.dx_params)?,
        record.file_path,
        record.file_count,
        record.file_size_total,
        record.file_modified_date,
        record.scan_id,
        record.is_active,
        record.created_at,
    ])?;
    Ok(())
}

fn insert_series_path_rows(conn: &Connection, entries: &[(String, String)]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO series_path (series_id, file_path, added_at) VALUES (?1, ?2, ?3)",
    )?;
    let added_at = now();
    let mut count = 0;
    for (series_id, file_path) in entries {
        count += stmt.execute(params![series_id, file_path, added_at])?;
    }
    Ok(count)
}

fn to_json<T: Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(|v| {
            serde_json::to_string(v).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        })
        .transpose()
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn series_from_row(row: &Row<'_>) -> Result<SeriesRecord> {
    Ok(SeriesRecord {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        patient_name: row.get(2)?,
        patient_sex: row.get(3)?,
        patient_birth_date: row.get(4)?,
        study_instance_uid: row.get(5)?,
        study_date: row.get(6)?,
        series_instance_uid: row.get(7)?,
        series_number: row.get(8)?,
        series_description: row.get(9)?,
        modality: row.get(10)?,
        protocol_name: row.get(11)?,
        manufacturer: row.get(12)?,
        manufacturer_model: row.get(13)?,
        ct_params: json_column(row, 14)?,
        mr_params: json_column(row, 15)?,
        dx_params: json_column(row, 16)?,
        file_path: row.get(17)?,
        file_count: row.get(18)?,
        file_size_total: row.get(19)?,
        file_modified_date: row.get(20)?,
        scan_id: row.get(21)?,
        is_active: row.get(22)?,
        created_at: row.get(23)?,
    })
}

fn scan_run_from_row(row: &Row<'_>) -> Result<ScanRun> {
    Ok(ScanRun {
        id: row.get(0)?,
        scan_path: row.get(1)?,
        trigger: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        files_found: row.get(5)?,
        series_found: row.get(6)?,
        series_new: row.get(7)?,
        series_duplicated: row.get(8)?,
        series_rejected: row.get(9)?,
        series_failed: row.get(10)?,
        status: row.get(11)?,
        error: row.get(12)?,
    })
}

fn scan_config_from_row(row: &Row<'_>) -> Result<ScanConfig> {
    Ok(ScanConfig {
        id: row.get(0)?,
        scan_path: row.get(1)?,
        description: row.get(2)?,
        is_active: row.get(3)?,
        schedule_type: row.get(4)?,
        recursive: row.get(5)?,
        last_scan_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn filter_rule_from_row(row: &Row<'_>) -> Result<FilterRule> {
    Ok(FilterRule {
        id: row.get(0)?,
        modality: row.get(1)?,
        max_slice_thickness: row.get(2)?,
        min_image_count: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
    })
}
