//! Stored file metadata persistence.

use rusqlite::{params, OptionalExtension};

use crate::domain::{AppError, NewStoredFile, Result, StoredFile};

use super::database::{now, to_db_time, Database};

impl Database {
    /// Insert a metadata row for a file already written to disk.
    pub fn insert_stored_file(&self, file: &NewStoredFile) -> Result<StoredFile> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO files (file_name, format, file_path, size, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &file.file_name,
                &file.format,
                &file.file_path,
                i64::try_from(file.size).unwrap_or(i64::MAX),
                to_db_time(now()),
            ],
        )
        .map_err(AppError::database)?;

        Ok(StoredFile {
            id: conn.last_insert_rowid(),
            file_name: file.file_name.clone(),
            format: file.format.clone(),
            file_path: file.file_path.clone(),
            size: file.size,
        })
    }

    /// Load one stored file by id.
    ///
    /// # Errors
    /// Returns [`AppError::RecordNotFound`] if no row has this id.
    pub fn find_stored_file(&self, id: i64) -> Result<StoredFile> {
        self.conn()?
            .query_row(
                "SELECT id, file_name, format, file_path, size FROM files WHERE id = ?1",
                [id],
                |row| {
                    Ok(StoredFile {
                        id: row.get(0)?,
                        file_name: row.get(1)?,
                        format: row.get(2)?,
                        file_path: row.get(3)?,
                        size: row.get::<_, i64>(4)?.unsigned_abs(),
                    })
                },
            )
            .optional()
            .map_err(AppError::database)?
            .ok_or(AppError::RecordNotFound {
                entity: "StoredFile",
                id,
            })
    }

    /// Delete a metadata row. References from backup records become NULL.
    ///
    /// # Errors
    /// Returns [`AppError::RecordNotFound`] if no row has this id.
    pub fn delete_stored_file(&self, id: i64) -> Result<()> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM files WHERE id = ?1", [id])
            .map_err(AppError::database)?;

        if deleted == 0 {
            return Err(AppError::RecordNotFound {
                entity: "StoredFile",
                id,
            });
        }

        Ok(())
    }
}
