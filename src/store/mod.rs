//! Persisted pipeline records (SQLite).
//!
//! Every mutation is a single-row update keyed by the record id, so the
//! only writer coordination needed is "one worker owns one record".
//! Status pollers read whatever is persisted, verbatim.

pub mod content;

pub use content::{ContentStore, JsonContentStore};

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::domain::{
    NarrationProject, NarrationSlide, NarrationStatus, SpeakerNote, VideoExportJob,
};
use crate::error::Result;

const CURRENT_SCHEMA_VERSION: i32 = 1;

pub struct RecordStore {
    // Mutex makes the store `Sync` so worker futures holding `&RecordStore`
    // across awaits stay `Send`; access is single-threaded in practice.
    conn: Mutex<Connection>,
}

impl RecordStore {
    /// Open (or create) the record database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute("PRAGMA foreign_keys = ON", ())?;
        // Concurrent workers share this file; wait out writer contention
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;

        Self::init_schema(&conn)?;

        Ok(RecordStore {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL,
                updated TEXT NOT NULL,
                PRIMARY KEY (version)
            )",
            (),
        )?;

        let version = match conn.query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        ) {
            Ok(v) => v,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                conn.execute(
                    "INSERT INTO schema_version (version, updated) VALUES (0, datetime('now'))",
                    [],
                )?;
                0
            }
            Err(e) => return Err(e.into()),
        };

        if version < CURRENT_SCHEMA_VERSION {
            Self::migrate_schema(conn, version)?;
        }

        Ok(())
    }

    fn migrate_schema(conn: &Connection, from_version: i32) -> Result<()> {
        match from_version {
            0 => {
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS narration_projects (
                        id TEXT PRIMARY KEY,
                        project_id TEXT NOT NULL,
                        voice TEXT NOT NULL,
                        speed REAL NOT NULL,
                        status TEXT NOT NULL,
                        total_duration_seconds INTEGER NOT NULL,
                        error TEXT,
                        created_at TEXT NOT NULL
                    )",
                    (),
                )?;

                conn.execute(
                    "CREATE TABLE IF NOT EXISTS narration_slides (
                        narration_id TEXT NOT NULL,
                        slide_id TEXT NOT NULL,
                        slide_number INTEGER NOT NULL,
                        notes_text TEXT NOT NULL,
                        audio_url TEXT NOT NULL,
                        duration_seconds INTEGER NOT NULL,
                        PRIMARY KEY (narration_id, slide_id)
                    )",
                    (),
                )?;

                conn.execute(
                    "CREATE TABLE IF NOT EXISTS speaker_notes (
                        slide_id TEXT PRIMARY KEY,
                        text TEXT NOT NULL,
                        ai_generated INTEGER NOT NULL,
                        updated_at TEXT NOT NULL
                    )",
                    (),
                )?;

                conn.execute(
                    "CREATE TABLE IF NOT EXISTS export_jobs (
                        id TEXT PRIMARY KEY,
                        project_id TEXT NOT NULL,
                        format TEXT NOT NULL,
                        resolution TEXT NOT NULL,
                        include_narration INTEGER NOT NULL,
                        transition TEXT NOT NULL,
                        default_slide_seconds REAL NOT NULL,
                        narration_id TEXT,
                        status TEXT NOT NULL,
                        progress INTEGER NOT NULL,
                        output_url TEXT,
                        error TEXT,
                        created_at TEXT NOT NULL
                    )",
                    (),
                )?;

                conn.execute(
                    "INSERT INTO schema_version (version, updated) VALUES (1, datetime('now'))",
                    [],
                )?;
            }
            // Future migrations can be added here
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Narration projects
    // ------------------------------------------------------------------

    pub fn insert_narration(&self, project: &NarrationProject) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT INTO narration_projects
             (id, project_id, voice, speed, status, total_duration_seconds, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            (
                project.id.to_string(),
                project.project_id.to_string(),
                project.voice.as_str(),
                project.speed,
                project.status.as_str(),
                project.total_duration_seconds,
                project.error.as_deref(),
                project.created_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    pub fn get_narration(&self, id: uuid::Uuid) -> Result<Option<NarrationProject>> {
        let result = self.conn.lock().unwrap().query_row(
            "SELECT id, project_id, voice, speed, status, total_duration_seconds, error, created_at
             FROM narration_projects WHERE id = ?1",
            [id.to_string()],
            narration_from_row,
        );
        match result {
            Ok(project) => Ok(Some(project)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the running total mid-run so a crash leaves a consistent
    /// partial figure instead of zero.
    pub fn update_narration_total(&self, id: uuid::Uuid, total_seconds: u32) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "UPDATE narration_projects SET total_duration_seconds = ?1 WHERE id = ?2",
            (total_seconds, id.to_string()),
        )?;
        Ok(())
    }

    pub fn complete_narration(&self, id: uuid::Uuid, total_seconds: u32) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "UPDATE narration_projects
             SET status = ?1, total_duration_seconds = ?2, error = NULL
             WHERE id = ?3",
            (
                NarrationStatus::Completed.as_str(),
                total_seconds,
                id.to_string(),
            ),
        )?;
        Ok(())
    }

    pub fn fail_narration(&self, id: uuid::Uuid, error: &str) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "UPDATE narration_projects SET status = ?1, error = ?2 WHERE id = ?3",
            (NarrationStatus::Failed.as_str(), error, id.to_string()),
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Narration slides
    // ------------------------------------------------------------------

    /// Keyed on (narration_id, slide_id): a retried attempt replaces its
    /// own row instead of inserting a duplicate.
    pub fn upsert_narration_slide(&self, slide: &NarrationSlide) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT OR REPLACE INTO narration_slides
             (narration_id, slide_id, slide_number, notes_text, audio_url, duration_seconds)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                slide.narration_id.to_string(),
                slide.slide_id.to_string(),
                slide.slide_number,
                slide.notes_text.as_str(),
                slide.audio_url.as_str(),
                slide.duration_seconds,
            ),
        )?;
        Ok(())
    }

    pub fn narration_slide_exists(&self, narration_id: uuid::Uuid, slide_id: uuid::Uuid) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT 1 FROM narration_slides WHERE narration_id = ?1 AND slide_id = ?2")?;
        let mut rows = stmt.query_map(
            [narration_id.to_string(), slide_id.to_string()],
            |row| row.get::<_, i32>(0),
        )?;
        Ok(rows.next().is_some())
    }

    pub fn list_narration_slides(&self, narration_id: uuid::Uuid) -> Result<Vec<NarrationSlide>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT narration_id, slide_id, slide_number, notes_text, audio_url, duration_seconds
             FROM narration_slides WHERE narration_id = ?1 ORDER BY slide_number ASC",
        )?;
        let rows = stmt.query_map([narration_id.to_string()], slide_from_row)?;
        let mut slides = Vec::new();
        for slide in rows {
            slides.push(slide?);
        }
        Ok(slides)
    }

    // ------------------------------------------------------------------
    // Speaker notes
    // ------------------------------------------------------------------

    /// At most one note per slide; later writes win.
    pub fn upsert_speaker_note(&self, note: &SpeakerNote) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT OR REPLACE INTO speaker_notes (slide_id, text, ai_generated, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            (
                note.slide_id.to_string(),
                note.text.as_str(),
                note.ai_generated,
                note.updated_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    pub fn get_speaker_note(&self, slide_id: uuid::Uuid) -> Result<Option<SpeakerNote>> {
        let result = self.conn.lock().unwrap().query_row(
            "SELECT slide_id, text, ai_generated, updated_at FROM speaker_notes WHERE slide_id = ?1",
            [slide_id.to_string()],
            note_from_row,
        );
        match result {
            Ok(note) => Ok(Some(note)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ------------------------------------------------------------------
    // Export jobs
    // ------------------------------------------------------------------

    pub fn insert_export_job(&self, job: &VideoExportJob) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT INTO export_jobs
             (id, project_id, format, resolution, include_narration, transition,
              default_slide_seconds, narration_id, status, progress, output_url, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            (
                job.id.to_string(),
                job.project_id.to_string(),
                job.format.as_str(),
                job.resolution.as_str(),
                job.include_narration,
                job.transition.as_str(),
                job.default_slide_seconds,
                job.narration_id.map(|id| id.to_string()),
                job.status.as_str(),
                job.progress,
                job.output_url.as_deref(),
                job.error.as_deref(),
                job.created_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    pub fn get_export_job(&self, id: uuid::Uuid) -> Result<Option<VideoExportJob>> {
        let result = self.conn.lock().unwrap().query_row(
            "SELECT id, project_id, format, resolution, include_narration, transition,
                    default_slide_seconds, narration_id, status, progress, output_url, error, created_at
             FROM export_jobs WHERE id = ?1",
            [id.to_string()],
            export_from_row,
        );
        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the mutable half of a job row after a state-machine step.
    pub fn save_export_job(&self, job: &VideoExportJob) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "UPDATE export_jobs
             SET status = ?1, progress = ?2, output_url = ?3, error = ?4
             WHERE id = ?5",
            (
                job.status.as_str(),
                job.progress,
                job.output_url.as_deref(),
                job.error.as_deref(),
                job.id.to_string(),
            ),
        )?;
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Row mapping
// ----------------------------------------------------------------------

/// Parse a TEXT column through `FromStr`, reporting failures as
/// conversion errors on the offending column.
fn parse_col<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            )),
        )
    })
}

fn narration_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NarrationProject> {
    Ok(NarrationProject {
        id: parse_col(0, &row.get::<_, String>(0)?)?,
        project_id: parse_col(1, &row.get::<_, String>(1)?)?,
        voice: parse_col(2, &row.get::<_, String>(2)?)?,
        speed: row.get(3)?,
        status: parse_col(4, &row.get::<_, String>(4)?)?,
        total_duration_seconds: row.get(5)?,
        error: row.get(6)?,
        created_at: parse_col(7, &row.get::<_, String>(7)?)?,
    })
}

fn slide_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NarrationSlide> {
    Ok(NarrationSlide {
        narration_id: parse_col(0, &row.get::<_, String>(0)?)?,
        slide_id: parse_col(1, &row.get::<_, String>(1)?)?,
        slide_number: row.get(2)?,
        notes_text: row.get(3)?,
        audio_url: row.get(4)?,
        duration_seconds: row.get(5)?,
    })
}

fn note_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SpeakerNote> {
    Ok(SpeakerNote {
        slide_id: parse_col(0, &row.get::<_, String>(0)?)?,
        text: row.get(1)?,
        ai_generated: row.get(2)?,
        updated_at: parse_col(3, &row.get::<_, String>(3)?)?,
    })
}

fn export_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VideoExportJob> {
    let narration_id: Option<String> = row.get(7)?;
    let narration_id = match narration_id {
        Some(s) => Some(parse_col(7, &s)?),
        None => None,
    };
    Ok(VideoExportJob {
        id: parse_col(0, &row.get::<_, String>(0)?)?,
        project_id: parse_col(1, &row.get::<_, String>(1)?)?,
        format: parse_col(2, &row.get::<_, String>(2)?)?,
        resolution: parse_col(3, &row.get::<_, String>(3)?)?,
        include_narration: row.get(4)?,
        transition: parse_col(5, &row.get::<_, String>(5)?)?,
        default_slide_seconds: row.get(6)?,
        narration_id,
        status: parse_col(8, &row.get::<_, String>(8)?)?,
        progress: row.get(9)?,
        output_url: row.get(10)?,
        error: row.get(11)?,
        created_at: parse_col(12, &row.get::<_, String>(12)?)?,
    })
}
