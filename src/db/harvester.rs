use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::{PgExecutor, PgQueryResult};
use sqlx::{Error, PgPool};

use crate::harvester::HarvestOutcome;
use crate::harvester::authors::AuthorRow;
use crate::harvester::extract::ArticleRecord;

pub struct ArticleParams<'a> {
    pub identifier: &'a str,
    pub id: Option<&'a str>,
    pub datestamp: Option<NaiveDate>,
    pub created: Option<NaiveDate>,
    pub updated: Option<NaiveDate>,
    pub title: Option<&'a str>,
    pub journal_ref: Option<&'a str>,
    pub doi: Option<&'a str>,
    pub msc_class: Option<&'a str>,
    pub abstract_text: Option<&'a str>,
}

impl<'a> From<&'a ArticleRecord> for ArticleParams<'a> {
    fn from(record: &'a ArticleRecord) -> Self {
        Self {
            identifier: &record.identifier,
            id: record.id.as_deref(),
            datestamp: record.datestamp,
            created: record.created,
            updated: record.updated,
            title: record.title.as_deref(),
            journal_ref: record.journal_ref.as_deref(),
            doi: record.doi.as_deref(),
            msc_class: record.msc_class.as_deref(),
            abstract_text: record.abstract_text.as_deref(),
        }
    }
}

pub struct AuthorParams<'a> {
    pub article_id: &'a str,
    pub keyname: Option<&'a str>,
    pub forenames: Option<&'a str>,
}

impl<'a> From<&'a AuthorRow> for AuthorParams<'a> {
    fn from(row: &'a AuthorRow) -> Self {
        Self {
            article_id: &row.article_id,
            keyname: row.keyname.as_deref(),
            forenames: row.forenames.as_deref(),
        }
    }
}

pub struct CategoryParams<'a> {
    pub article_id: &'a str,
    pub position: i32,
    pub category: &'a str,
}

/// Row counts touched by [`save_outcome`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SaveSummary {
    pub articles: u64,
    pub authors: u64,
    pub categories: u64,
}

/// Insert an article or overwrite the stored one with the same identifier.
pub async fn do_upsert_article_query<'e, E: PgExecutor<'e>>(
    executor: E,
    params: ArticleParams<'_>,
) -> Result<PgQueryResult, Error> {
    sqlx::query(
        r#"
        INSERT INTO arxiv_articles (
            identifier, id, datestamp, created, updated,
            title, journal_ref, doi, msc_class, abstract
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (identifier) DO UPDATE SET
            id = EXCLUDED.id,
            datestamp = EXCLUDED.datestamp,
            created = EXCLUDED.created,
            updated = EXCLUDED.updated,
            title = EXCLUDED.title,
            journal_ref = EXCLUDED.journal_ref,
            doi = EXCLUDED.doi,
            msc_class = EXCLUDED.msc_class,
            abstract = EXCLUDED.abstract,
            last_harvested_at = NOW()
        "#,
    )
    .bind(params.identifier)
    .bind(params.id)
    .bind(params.datestamp)
    .bind(params.created)
    .bind(params.updated)
    .bind(params.title)
    .bind(params.journal_ref)
    .bind(params.doi)
    .bind(params.msc_class)
    .bind(params.abstract_text)
    .execute(executor)
    .await
}

/// Missing name parts are stored as empty strings so they can be part of the key.
pub async fn do_insert_author_query<'e, E: PgExecutor<'e>>(
    executor: E,
    params: AuthorParams<'_>,
) -> Result<PgQueryResult, Error> {
    sqlx::query(
        r#"
        INSERT INTO arxiv_authors (article_id, keyname, forenames)
        VALUES ($1, COALESCE($2, ''), COALESCE($3, ''))
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(params.article_id)
    .bind(params.keyname)
    .bind(params.forenames)
    .execute(executor)
    .await
}

pub async fn do_delete_categories_query<'e, E: PgExecutor<'e>>(
    executor: E,
    article_id: &str,
) -> Result<PgQueryResult, Error> {
    sqlx::query("DELETE FROM arxiv_article_categories WHERE article_id = $1")
        .bind(article_id)
        .execute(executor)
        .await
}

pub async fn do_insert_category_query<'e, E: PgExecutor<'e>>(
    executor: E,
    params: CategoryParams<'_>,
) -> Result<PgQueryResult, Error> {
    sqlx::query(
        r#"
        INSERT INTO arxiv_article_categories (article_id, position, category)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(params.article_id)
    .bind(params.position)
    .bind(params.category)
    .execute(executor)
    .await
}

/// Store everything a harvest produced in a single transaction.
pub async fn save_outcome(pool: &PgPool, outcome: &HarvestOutcome) -> anyhow::Result<SaveSummary> {
    let mut summary = SaveSummary::default();
    let mut tx = pool.begin().await?;

    for article in &outcome.articles {
        summary.articles += do_upsert_article_query(&mut *tx, article.into())
            .await
            .with_context(|| format!("Failed to store article {}", article.identifier))?
            .rows_affected();

        do_delete_categories_query(&mut *tx, &article.identifier).await?;
        for (position, category) in article.categories.iter().flatten().enumerate() {
            let params = CategoryParams {
                article_id: &article.identifier,
                position: i32::try_from(position)?,
                category,
            };
            summary.categories += do_insert_category_query(&mut *tx, params)
                .await?
                .rows_affected();
        }
    }

    for author in &outcome.authors {
        summary.authors += do_insert_author_query(&mut *tx, author.into())
            .await
            .with_context(|| format!("Failed to store an author of {}", author.article_id))?
            .rows_affected();
    }

    tx.commit().await?;
    Ok(summary)
}
