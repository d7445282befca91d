// SQLite result store: latest merged sections and cycle report per host.
// One row per host, replaced inside a transaction so readers never see a partial write.

use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

use crate::blob;
use crate::models::{CycleReport, MergedHostData, Section, State};

pub struct ResultStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredHostData {
    pub host: String,
    pub written_at_ms: i64,
    pub state: State,
    pub sections: MergedHostData,
    pub report: CycleReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSummary {
    pub host: String,
    pub written_at_ms: i64,
    pub state: State,
    pub section_count: i64,
}

impl ResultStore {
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS host_results (
                host TEXT PRIMARY KEY,
                written_at INTEGER NOT NULL,
                state INTEGER NOT NULL,
                section_count INTEGER NOT NULL,
                sections_data BLOB NOT NULL,
                report_data BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace the stored data of `host` with this cycle's sections and report.
    #[instrument(skip(self, data, report), fields(repo = "results", operation = "write", sections = data.len()))]
    pub async fn write(
        &self,
        host: &str,
        data: &MergedHostData,
        report: &CycleReport,
    ) -> anyhow::Result<()> {
        let sections: Vec<Section> = data.iter().cloned().collect();
        let sections_data = blob::with_version_prefix(
            blob::STORED_SECTIONS_VERSION,
            wincode::serialize(&sections).map_err(|e| anyhow::anyhow!("wincode sections: {}", e))?,
        );
        let report_data = blob::with_version_prefix(
            blob::CYCLE_REPORT_VERSION,
            wincode::serialize(report).map_err(|e| anyhow::anyhow!("wincode report: {}", e))?,
        );
        let written_at = chrono::Utc::now().timestamp_millis();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO host_results (host, written_at, state, section_count, sections_data, report_data)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT(host) DO UPDATE SET
                written_at = excluded.written_at,
                state = excluded.state,
                section_count = excluded.section_count,
                sections_data = excluded.sections_data,
                report_data = excluded.report_data
            "#,
        )
        .bind(host)
        .bind(written_at)
        .bind(report.host_state.code())
        .bind(data.len() as i64)
        .bind(&sections_data)
        .bind(&report_data)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "results", operation = "read"))]
    pub async fn read(&self, host: &str) -> anyhow::Result<Option<StoredHostData>> {
        let row = sqlx::query(
            "SELECT host, written_at, state, sections_data, report_data FROM host_results WHERE host = $1",
        )
        .bind(host)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let sections_blob: Vec<u8> = row.try_get("sections_data")?;
        let payload = blob::blob_payload(&sections_blob, blob::STORED_SECTIONS_VERSION)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "sections_data: unsupported blob version {}",
                    blob::blob_version(&sections_blob)
                )
            })?;
        let sections: Vec<Section> = wincode::deserialize(payload)
            .map_err(|e| anyhow::anyhow!("wincode deserialize sections: {}", e))?;

        let report_blob: Vec<u8> = row.try_get("report_data")?;
        let payload = blob::blob_payload(&report_blob, blob::CYCLE_REPORT_VERSION)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "report_data: unsupported blob version {}",
                    blob::blob_version(&report_blob)
                )
            })?;
        let report: CycleReport = wincode::deserialize(payload)
            .map_err(|e| anyhow::anyhow!("wincode deserialize report: {}", e))?;

        let state: i64 = row.try_get("state")?;
        Ok(Some(StoredHostData {
            host: row.try_get("host")?,
            written_at_ms: row.try_get("written_at")?,
            state: State::from_code(state as i32),
            sections: MergedHostData::from_sections(sections),
            report,
        }))
    }

    pub async fn hosts(&self) -> anyhow::Result<Vec<HostSummary>> {
        let rows = sqlx::query(
            "SELECT host, written_at, state, section_count FROM host_results ORDER BY host ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let state: i64 = row.try_get("state")?;
            out.push(HostSummary {
                host: row.try_get("host")?,
                written_at_ms: row.try_get("written_at")?,
                state: State::from_code(state as i32),
                section_count: row.try_get("section_count")?,
            });
        }
        Ok(out)
    }
}
