use super::Store;
use crate::types::{
    Article, ArticleUpsert, Feed, FeedRefresh, NewFeed, ParsedArticle, PipelineError, Result,
    WindowQuery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

/// Postgres-backed store. All statements are runtime queries; the upsert
/// pushes the insert-or-append down to a single `ON CONFLICT` statement so
/// the per-guid atomicity requirement holds without client-side locking.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Provision the schema if it is not there yet.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id UUID PRIMARY KEY,
                url TEXT NOT NULL,
                title TEXT,
                description TEXT,
                link TEXT,
                image_url TEXT,
                language TEXT,
                last_fetched TIMESTAMPTZ,
                active BOOLEAN NOT NULL DEFAULT true,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS feeds_url_idx ON feeds (url)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                guid TEXT PRIMARY KEY,
                feed_id UUID NOT NULL,
                source_feed_ids UUID[] NOT NULL,
                title TEXT NOT NULL,
                link TEXT NOT NULL,
                content TEXT,
                summary TEXT,
                author TEXT,
                categories JSONB NOT NULL DEFAULT '[]'::jsonb,
                image_url TEXT,
                published_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS articles_published_at_idx ON articles (published_at)",
        )
        .execute(&self.pool)
        .await?;

        info!("Database schema ready");
        Ok(())
    }
}

fn store_error(op: &'static str, error: sqlx::Error) -> PipelineError {
    if let sqlx::Error::Database(db_error) = &error {
        if matches!(db_error.kind(), sqlx::error::ErrorKind::UniqueViolation) {
            return PipelineError::Conflict(db_error.message().to_string());
        }
    }
    PipelineError::Store {
        op,
        message: error.to_string(),
    }
}

fn row_to_feed(row: &PgRow) -> Result<Feed> {
    Ok(Feed {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        link: row.try_get("link")?,
        image_url: row.try_get("image_url")?,
        language: row.try_get("language")?,
        last_fetched: row.try_get::<Option<DateTime<Utc>>, _>("last_fetched")?,
        active: row.try_get("active")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn row_to_article(row: &PgRow) -> Result<Article> {
    let categories_json: serde_json::Value = row.try_get("categories").unwrap_or_default();
    let categories: Vec<String> = serde_json::from_value(categories_json).unwrap_or_default();

    Ok(Article {
        guid: row.try_get("guid")?,
        feed_id: row.try_get("feed_id")?,
        source_feed_ids: row.try_get::<Vec<Uuid>, _>("source_feed_ids")?,
        title: row.try_get("title")?,
        link: row.try_get("link")?,
        content: row.try_get("content")?,
        summary: row.try_get("summary")?,
        author: row.try_get("author")?,
        categories,
        image_url: row.try_get("image_url")?,
        published_at: row.try_get::<DateTime<Utc>, _>("published_at")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn add_feed(&self, feed: NewFeed) -> Result<Feed> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO feeds (id, url, title, description, active, created_at)
            VALUES ($1, $2, $3, $4, true, $5)
            "#,
        )
        .bind(id)
        .bind(&feed.url)
        .bind(&feed.title)
        .bind(&feed.description)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("add_feed", e))?;

        info!("Added feed: {} with ID: {}", feed.url, id);

        Ok(Feed {
            id,
            url: feed.url,
            title: feed.title,
            description: feed.description,
            link: None,
            image_url: None,
            language: None,
            last_fetched: None,
            active: true,
            created_at: now,
        })
    }

    async fn feed(&self, id: Uuid) -> Result<Feed> {
        let row = sqlx::query("SELECT * FROM feeds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("feed", e))?;

        match row {
            Some(row) => row_to_feed(&row),
            None => Err(PipelineError::FeedNotFound { id }),
        }
    }

    async fn list_feeds(&self) -> Result<Vec<Feed>> {
        let rows = sqlx::query("SELECT * FROM feeds ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("list_feeds", e))?;

        rows.iter().map(row_to_feed).collect()
    }

    async fn set_feed_active(&self, id: Uuid, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE feeds SET active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("set_feed_active", e))?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::FeedNotFound { id });
        }
        Ok(())
    }

    async fn remove_feed(&self, id: Uuid) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("remove_feed", e))?;

        let deleted = sqlx::query("DELETE FROM feeds WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("remove_feed", e))?;

        if deleted.rows_affected() == 0 {
            return Err(PipelineError::FeedNotFound { id });
        }

        // Cascade only to articles this feed alone has ever produced.
        sqlx::query(
            r#"
            DELETE FROM articles
            WHERE feed_id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM unnest(articles.source_feed_ids) AS sid WHERE sid <> $1
              )
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error("remove_feed", e))?;

        tx.commit().await.map_err(|e| store_error("remove_feed", e))?;
        Ok(())
    }

    async fn latest_fetch_for_url(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT MAX(last_fetched) AS latest FROM feeds WHERE url = $1")
            .bind(url)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("latest_fetch_for_url", e))?;

        Ok(row.try_get::<Option<DateTime<Utc>>, _>("latest")?)
    }

    async fn record_refresh(&self, feed_id: Uuid, refresh: FeedRefresh) -> Result<()> {
        let metadata = &refresh.metadata;
        let result = sqlx::query(
            r#"
            UPDATE feeds SET
                last_fetched = $2,
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                link = COALESCE($5, link),
                image_url = COALESCE($6, image_url),
                language = COALESCE($7, language)
            WHERE id = $1 AND (last_fetched IS NULL OR last_fetched < $2)
            "#,
        )
        .bind(feed_id)
        .bind(refresh.fetched_at)
        .bind(&metadata.title)
        .bind(&metadata.description)
        .bind(&metadata.link)
        .bind(&metadata.image_url)
        .bind(&metadata.language)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("record_refresh", e))?;

        if result.rows_affected() == 0 {
            // Either the feed vanished or a newer refresh already landed.
            let exists = sqlx::query("SELECT 1 FROM feeds WHERE id = $1")
                .bind(feed_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| store_error("record_refresh", e))?;

            if exists.is_none() {
                return Err(PipelineError::FeedNotFound { id: feed_id });
            }
            debug!("Refresh for feed {} raced by a newer one, dropping", feed_id);
        }

        Ok(())
    }

    async fn upsert_article(&self, article: &ParsedArticle) -> Result<ArticleUpsert> {
        let row = sqlx::query(
            r#"
            INSERT INTO articles (guid, feed_id, source_feed_ids, title, link, content,
                                  summary, author, categories, image_url, published_at, created_at)
            VALUES ($1, $2, ARRAY[$2], $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (guid) DO UPDATE
                SET source_feed_ids = array_append(articles.source_feed_ids, $2)
            RETURNING (xmax = 0) AS created
            "#,
        )
        .bind(&article.guid)
        .bind(article.feed_id)
        .bind(&article.title)
        .bind(&article.link)
        .bind(&article.content)
        .bind(&article.summary)
        .bind(&article.author)
        .bind(serde_json::to_value(&article.categories)?)
        .bind(&article.image_url)
        .bind(article.published_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("upsert_article", e))?;

        let created: bool = row.try_get("created")?;
        Ok(if created {
            ArticleUpsert::Created
        } else {
            ArticleUpsert::Merged
        })
    }

    async fn article(&self, guid: &str) -> Result<Option<Article>> {
        let row = sqlx::query("SELECT * FROM articles WHERE guid = $1")
            .bind(guid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("article", e))?;

        row.as_ref().map(row_to_article).transpose()
    }

    async fn articles_in_window(&self, query: &WindowQuery) -> Result<Vec<Article>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM articles
            WHERE (feed_id = ANY($1) OR source_feed_ids && $1)
              AND published_at >= $2
              AND published_at <= $3
            ORDER BY published_at DESC
            LIMIT $4
            "#,
        )
        .bind(&query.feed_ids)
        .bind(query.start)
        .bind(query.end)
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("articles_in_window", e))?;

        rows.iter().map(row_to_article).collect()
    }
}
