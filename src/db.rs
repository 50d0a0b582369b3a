use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteExecutor, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::models::{Ap2Part, Ap2Scores, Entry, EntryInput, ProjectWork, Score};

const SELECT_ENTRIES: &str = "SELECT id, name, ap1, \
     ap2_planning_main, ap2_planning_extra, \
     ap2_development_main, ap2_development_extra, \
     ap2_economy_main, ap2_economy_extra, \
     pw_project, pw_presentation, created_at, updated_at \
     FROM entries";

pub async fn connect(path: &Path) -> anyhow::Result<SqlitePool> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open database {}", path.display()))
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &SqlitePool) -> anyhow::Result<()> {
    let entries = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Avery Lee",
            [Some(92), Some(85), None, Some(88), None, Some(79), None, Some(90), Some(94)],
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Jules Moreno",
            [Some(58), Some(45), Some(62), Some(61), None, Some(55), None, Some(70), Some(66)],
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Kiara Patel",
            [Some(74), Some(81), None, None, None, Some(68), None, None, None],
        ),
    ];

    for (id, name, scores) in entries {
        let [ap1, planning_main, planning_extra, development_main, development_extra, economy_main, economy_extra, project, presentation] =
            scores;
        let input = EntryInput {
            name: name.to_string(),
            ap1,
            ap2: Ap2Scores {
                planning: Ap2Part {
                    main: planning_main,
                    extra: planning_extra,
                },
                development: Ap2Part {
                    main: development_main,
                    extra: development_extra,
                },
                economy: Ap2Part {
                    main: economy_main,
                    extra: economy_extra,
                },
            },
            pw: ProjectWork {
                project,
                presentation,
            },
        };
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO entries
            (id, name, ap1, ap2_planning_main, ap2_planning_extra,
             ap2_development_main, ap2_development_extra,
             ap2_economy_main, ap2_economy_extra,
             pw_project, pw_presentation, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE
            SET name = excluded.name,
                ap1 = excluded.ap1,
                ap2_planning_main = excluded.ap2_planning_main,
                ap2_planning_extra = excluded.ap2_planning_extra,
                ap2_development_main = excluded.ap2_development_main,
                ap2_development_extra = excluded.ap2_development_extra,
                ap2_economy_main = excluded.ap2_economy_main,
                ap2_economy_extra = excluded.ap2_economy_extra,
                pw_project = excluded.pw_project,
                pw_presentation = excluded.pw_presentation,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id.to_string())
        .bind(&input.name)
        .bind(to_db(input.ap1))
        .bind(to_db(input.ap2.planning.main))
        .bind(to_db(input.ap2.planning.extra))
        .bind(to_db(input.ap2.development.main))
        .bind(to_db(input.ap2.development.extra))
        .bind(to_db(input.ap2.economy.main))
        .bind(to_db(input.ap2.economy.extra))
        .bind(to_db(input.pw.project))
        .bind(to_db(input.pw.presentation))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn insert_entry<'e>(
    executor: impl SqliteExecutor<'e>,
    input: &EntryInput,
) -> anyhow::Result<Entry> {
    let now = Utc::now();
    let entry = Entry {
        id: Uuid::new_v4(),
        name: input.name.clone(),
        ap1: input.ap1,
        ap2: input.ap2,
        pw: input.pw,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO entries
        (id, name, ap1, ap2_planning_main, ap2_planning_extra,
         ap2_development_main, ap2_development_extra,
         ap2_economy_main, ap2_economy_extra,
         pw_project, pw_presentation, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(&entry.name)
    .bind(to_db(entry.ap1))
    .bind(to_db(entry.ap2.planning.main))
    .bind(to_db(entry.ap2.planning.extra))
    .bind(to_db(entry.ap2.development.main))
    .bind(to_db(entry.ap2.development.extra))
    .bind(to_db(entry.ap2.economy.main))
    .bind(to_db(entry.ap2.economy.extra))
    .bind(to_db(entry.pw.project))
    .bind(to_db(entry.pw.presentation))
    .bind(entry.created_at)
    .bind(entry.updated_at)
    .execute(executor)
    .await
    .context("failed to insert entry")?;

    info!(entry_id = %entry.id, name = %entry.name, "entry saved");
    Ok(entry)
}

pub async fn list_entries(pool: &SqlitePool) -> anyhow::Result<Vec<Entry>> {
    let query = format!("{SELECT_ENTRIES} ORDER BY created_at, rowid");
    let rows = sqlx::query(&query).fetch_all(pool).await?;

    rows.iter().map(row_to_entry).collect()
}

pub async fn fetch_entry(pool: &SqlitePool, id: Uuid) -> anyhow::Result<Option<Entry>> {
    let query = format!("{SELECT_ENTRIES} WHERE id = $1");
    let row = sqlx::query(&query)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_entry).transpose()
}

pub async fn update_entry(
    pool: &SqlitePool,
    id: Uuid,
    input: &EntryInput,
) -> anyhow::Result<Option<Entry>> {
    let result = sqlx::query(
        r#"
        UPDATE entries
        SET name = $2,
            ap1 = $3,
            ap2_planning_main = $4,
            ap2_planning_extra = $5,
            ap2_development_main = $6,
            ap2_development_extra = $7,
            ap2_economy_main = $8,
            ap2_economy_extra = $9,
            pw_project = $10,
            pw_presentation = $11,
            updated_at = $12
        WHERE id = $1
        "#,
    )
    .bind(id.to_string())
    .bind(&input.name)
    .bind(to_db(input.ap1))
    .bind(to_db(input.ap2.planning.main))
    .bind(to_db(input.ap2.planning.extra))
    .bind(to_db(input.ap2.development.main))
    .bind(to_db(input.ap2.development.extra))
    .bind(to_db(input.ap2.economy.main))
    .bind(to_db(input.ap2.economy.extra))
    .bind(to_db(input.pw.project))
    .bind(to_db(input.pw.presentation))
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("failed to update entry")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    info!(entry_id = %id, "entry updated");
    fetch_entry(pool, id).await
}

pub async fn delete_entry(pool: &SqlitePool, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM entries WHERE id = $1")
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("failed to delete entry")?;

    let deleted = result.rows_affected() > 0;
    if deleted {
        info!(entry_id = %id, "entry deleted");
    }
    Ok(deleted)
}

pub async fn import_csv(pool: &SqlitePool, csv_path: &Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        name: String,
        ap1: Option<Score>,
        ap2_planning_main: Option<Score>,
        ap2_planning_extra: Option<Score>,
        ap2_development_main: Option<Score>,
        ap2_development_extra: Option<Score>,
        ap2_economy_main: Option<Score>,
        ap2_economy_extra: Option<Score>,
        pw_project: Option<Score>,
        pw_presentation: Option<Score>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut tx = pool.begin().await.context("failed to start import")?;
    let mut inserted = 0usize;

    // any bad row rolls back the whole file
    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        // header is line 1
        let line = index + 2;
        let row = result.with_context(|| format!("invalid CSV row on line {line}"))?;
        let input = EntryInput {
            name: row.name,
            ap1: row.ap1,
            ap2: Ap2Scores {
                planning: Ap2Part {
                    main: row.ap2_planning_main,
                    extra: row.ap2_planning_extra,
                },
                development: Ap2Part {
                    main: row.ap2_development_main,
                    extra: row.ap2_development_extra,
                },
                economy: Ap2Part {
                    main: row.ap2_economy_main,
                    extra: row.ap2_economy_extra,
                },
            },
            pw: ProjectWork {
                project: row.pw_project,
                presentation: row.pw_presentation,
            },
        };
        input
            .validate()
            .with_context(|| format!("invalid scores on line {line}"))?;

        insert_entry(&mut *tx, &input)
            .await
            .with_context(|| format!("failed to import line {line}"))?;
        inserted += 1;
    }

    tx.commit().await.context("failed to commit import")?;
    info!(inserted, path = %csv_path.display(), "csv imported");
    Ok(inserted)
}

fn to_db(score: Option<Score>) -> Option<i64> {
    score.map(i64::from)
}

fn score_column(row: &SqliteRow, column: &str) -> anyhow::Result<Option<Score>> {
    let value: Option<i64> = row.try_get(column)?;
    value
        .map(|raw| {
            Score::try_from(raw).with_context(|| format!("column {column} holds invalid score {raw}"))
        })
        .transpose()
}

fn row_to_entry(row: &SqliteRow) -> anyhow::Result<Entry> {
    let id: String = row.try_get("id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Entry {
        id: Uuid::parse_str(&id).with_context(|| format!("stored entry id is not a UUID: {id}"))?,
        name: row.try_get("name")?,
        ap1: score_column(row, "ap1")?,
        ap2: Ap2Scores {
            planning: Ap2Part {
                main: score_column(row, "ap2_planning_main")?,
                extra: score_column(row, "ap2_planning_extra")?,
            },
            development: Ap2Part {
                main: score_column(row, "ap2_development_main")?,
                extra: score_column(row, "ap2_development_extra")?,
            },
            economy: Ap2Part {
                main: score_column(row, "ap2_economy_main")?,
                extra: score_column(row, "ap2_economy_extra")?,
            },
        },
        pw: ProjectWork {
            project: score_column(row, "pw_project")?,
            presentation: score_column(row, "pw_presentation")?,
        },
        created_at,
        updated_at,
    })
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    init_db(&pool).await.expect("migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn input(name: &str, ap1: Option<Score>) -> EntryInput {
        EntryInput {
            name: name.to_string(),
            ap1,
            ap2: Ap2Scores {
                planning: Ap2Part {
                    main: Some(80),
                    extra: Some(70),
                },
                ..Ap2Scores::default()
            },
            pw: ProjectWork {
                project: Some(90),
                presentation: None,
            },
        }
    }

    #[tokio::test]
    async fn saved_entries_get_fresh_ids() {
        let pool = test_pool().await;
        let first = insert_entry(&pool, &input("Anna", Some(100))).await.expect("insert");
        let second = insert_entry(&pool, &input("Ben", Some(50))).await.expect("insert");
        assert_ne!(first.id, second.id);

        let all = list_entries(&pool).await.expect("list");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Anna");
        assert_eq!(all[1].name, "Ben");
        assert_eq!(all[0].ap2.planning.extra, Some(70));
        assert_eq!(all[0].pw.presentation, None);
    }

    #[tokio::test]
    async fn fetch_unknown_id_is_none() {
        let pool = test_pool().await;
        let found = fetch_entry(&pool, Uuid::new_v4()).await.expect("query");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn update_keeps_identity() {
        let pool = test_pool().await;
        let saved = insert_entry(&pool, &input("Anna", Some(100))).await.expect("insert");

        let mut changed = input("Anna Updated", Some(55));
        changed.ap2.planning.extra = None;
        let updated = update_entry(&pool, saved.id, &changed)
            .await
            .expect("update")
            .expect("entry exists");

        assert_eq!(updated.id, saved.id);
        assert_eq!(updated.created_at, saved.created_at);
        assert_eq!(updated.name, "Anna Updated");
        assert_eq!(updated.ap1, Some(55));
        assert_eq!(updated.ap2.planning.extra, None);

        let missing = update_entry(&pool, Uuid::new_v4(), &changed).await.expect("update");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let pool = test_pool().await;
        let anna = insert_entry(&pool, &input("Anna", Some(100))).await.expect("insert");
        let ben = insert_entry(&pool, &input("Ben", Some(50))).await.expect("insert");

        assert!(delete_entry(&pool, anna.id).await.expect("delete"));
        assert!(!delete_entry(&pool, anna.id).await.expect("delete"));

        let remaining = list_entries(&pool).await.expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, ben.id);
    }

    #[tokio::test]
    async fn seed_is_repeatable() {
        let pool = test_pool().await;
        seed(&pool).await.expect("seed");
        seed(&pool).await.expect("seed again");

        let all = list_entries(&pool).await.expect("list");
        assert_eq!(all.len(), 3);
        assert!(all.iter().any(|entry| entry.name == "Avery Lee" && entry.is_complete()));
        assert!(all.iter().any(|entry| entry.name == "Kiara Patel" && !entry.is_complete()));
    }

    #[tokio::test]
    async fn import_reads_optional_cells() {
        let pool = test_pool().await;
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "name,ap1,ap2_planning_main,ap2_planning_extra,ap2_development_main,ap2_development_extra,ap2_economy_main,ap2_economy_extra,pw_project,pw_presentation"
        )
        .expect("write header");
        writeln!(file, "Avery Lee,92,85,,85,,85,,90,90").expect("write row");
        writeln!(file, "Jules Moreno,58,45,62,61,,55,,,").expect("write row");

        let inserted = import_csv(&pool, file.path()).await.expect("import");
        assert_eq!(inserted, 2);

        let all = list_entries(&pool).await.expect("list");
        let jules = all
            .iter()
            .find(|entry| entry.name == "Jules Moreno")
            .expect("imported");
        assert_eq!(jules.ap2.planning.extra, Some(62));
        assert_eq!(jules.pw.project, None);
    }

    #[tokio::test]
    async fn import_rejects_out_of_range_rows() {
        let pool = test_pool().await;
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "name,ap1,ap2_planning_main,ap2_planning_extra,ap2_development_main,ap2_development_extra,ap2_economy_main,ap2_economy_extra,pw_project,pw_presentation"
        )
        .expect("write header");
        writeln!(file, "Avery Lee,92,85,,85,,85,,90,90").expect("write row");
        writeln!(file, "Broken,120,85,,85,,85,,90,90").expect("write row");

        let err = import_csv(&pool, file.path()).await.unwrap_err();
        assert!(format!("{err:#}").contains("line 3"));

        let stored = list_entries(&pool).await.expect("list");
        assert!(stored.is_empty(), "valid line 2 must not survive a failed import");
    }
}
