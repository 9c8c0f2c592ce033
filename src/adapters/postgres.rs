use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::{
    ChannelId, CommunityId, Invite, InviteId, InviteStatus, Jam, JamId, JamSettings, JamWindows,
    NewJam, NewTeam, RoleId, Team, TeamId, TimeWindow, UserId,
};
use crate::error::{JamError, Result};
use crate::ports::{AtomicScope, JamStore, LockKey};

const UNIQUE_TEAM_NAME: &str = "teams_unique_name";
const ONE_TEAM_PER_JAM: &str = "team_members_one_team_per_jam";
const ONE_PENDING_PER_PAIR: &str = "idx_invites_one_pending_per_pair";

const JAM_COLUMNS: &str = r#"
    id, community_id, topic, tagline, timezone,
    registration_start, registration_end,
    active_start, active_end,
    voting_start, voting_end,
    voting_open
"#;

const TEAM_COLUMNS: &str =
    "id, jam_id, name, leader_id, role_id, text_channel_id, voice_channel_id";

const INVITE_COLUMNS: &str = "id, jam_id, team_id, inviter_id, invitee_id, issued_at, status";

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ==================== Row mapping ====================

fn window(row: &PgRow, start: &str, end: &str) -> Result<TimeWindow> {
    TimeWindow::new(row.get(start), row.get(end))
}

fn jam_from_row(row: &PgRow, registrations: BTreeSet<UserId>) -> Result<Jam> {
    let windows = JamWindows::new(
        window(row, "registration_start", "registration_end")?,
        window(row, "active_start", "active_end")?,
        window(row, "voting_start", "voting_end")?,
    )?;

    Ok(Jam {
        id: JamId(row.get("id")),
        community: CommunityId::from_i64(row.get("community_id")),
        topic: row.get("topic"),
        tagline: row.get("tagline"),
        timezone: row.get("timezone"),
        windows,
        voting_open: row.get("voting_open"),
        registrations,
    })
}

fn team_from_row(row: &PgRow, members: BTreeSet<UserId>) -> Team {
    Team {
        id: TeamId(row.get("id")),
        jam: JamId(row.get("jam_id")),
        name: row.get("name"),
        leader: UserId::from_i64(row.get("leader_id")),
        role: RoleId::from_i64(row.get("role_id")),
        text_channel: ChannelId::from_i64(row.get("text_channel_id")),
        voice_channel: ChannelId::from_i64(row.get("voice_channel_id")),
        members,
    }
}

fn invite_from_row(row: &PgRow) -> Result<Invite> {
    let status: String = row.get("status");
    Ok(Invite {
        id: InviteId(row.get::<Uuid, _>("id")),
        jam: JamId(row.get("jam_id")),
        team: TeamId(row.get("team_id")),
        inviter: UserId::from_i64(row.get("inviter_id")),
        invitee: UserId::from_i64(row.get("invitee_id")),
        issued_at: row.get("issued_at"),
        status: status.parse().map_err(JamError::Internal)?,
    })
}

fn violated_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.constraint().map(str::to_string),
        _ => None,
    }
}

/// Map a unique-constraint violation onto the business error it stands for
fn constraint_error(err: sqlx::Error) -> JamError {
    match violated_constraint(&err).as_deref() {
        Some(ONE_TEAM_PER_JAM) => JamError::AlreadyInTeam,
        Some(ONE_PENDING_PER_PAIR) => {
            JamError::Internal("pending invite already exists for this pair".to_string())
        }
        _ => JamError::Database(err),
    }
}

// ==================== Shared queries ====================

async fn fetch_jam(conn: &mut PgConnection, id: JamId) -> Result<Option<Jam>> {
    let row = sqlx::query(&format!("SELECT {} FROM jams WHERE id = $1", JAM_COLUMNS))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let registrations = fetch_registrations(conn, id).await?;
            Ok(Some(jam_from_row(&row, registrations)?))
        }
        None => Ok(None),
    }
}

async fn fetch_registrations(conn: &mut PgConnection, jam: JamId) -> Result<BTreeSet<UserId>> {
    let rows = sqlx::query("SELECT user_id FROM jam_registrations WHERE jam_id = $1")
        .bind(jam.0)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .iter()
        .map(|r| UserId::from_i64(r.get("user_id")))
        .collect())
}

async fn fetch_members(conn: &mut PgConnection, team: TeamId) -> Result<BTreeSet<UserId>> {
    let rows = sqlx::query("SELECT user_id FROM team_members WHERE team_id = $1")
        .bind(team.0)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .iter()
        .map(|r| UserId::from_i64(r.get("user_id")))
        .collect())
}

async fn fetch_team_where(
    conn: &mut PgConnection,
    filter: &str,
    jam: JamId,
    arg: TeamFilterArg<'_>,
) -> Result<Option<Team>> {
    let sql = format!("SELECT {} FROM teams t WHERE {}", TEAM_COLUMNS, filter);
    let query = sqlx::query(&sql).bind(jam.0);
    let query = match arg {
        TeamFilterArg::User(user) => query.bind(user),
        TeamFilterArg::Name(name) => query.bind(name),
    };

    match query.fetch_optional(&mut *conn).await? {
        Some(row) => {
            let id = TeamId(row.get("id"));
            let members = fetch_members(conn, id).await?;
            Ok(Some(team_from_row(&row, members)))
        }
        None => Ok(None),
    }
}

enum TeamFilterArg<'a> {
    User(i64),
    Name(&'a str),
}

async fn fetch_invite(conn: &mut PgConnection, id: InviteId) -> Result<Option<Invite>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM invites WHERE id = $1",
        INVITE_COLUMNS
    ))
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(invite_from_row).transpose()
}

#[async_trait]
impl JamStore for PostgresStore {
    #[instrument(skip(self, jam), fields(community = %jam.community))]
    async fn insert_jam(&self, jam: &NewJam) -> Result<Jam> {
        let row = sqlx::query(
            r#"
            INSERT INTO jams (
                community_id, topic, tagline, timezone,
                registration_start, registration_end,
                active_start, active_end,
                voting_start, voting_end
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(jam.community.as_i64())
        .bind(&jam.topic)
        .bind(&jam.tagline)
        .bind(&jam.timezone)
        .bind(jam.windows.registration().start())
        .bind(jam.windows.registration().end())
        .bind(jam.windows.active().start())
        .bind(jam.windows.active().end())
        .bind(jam.windows.voting().start())
        .bind(jam.windows.voting().end())
        .fetch_one(&self.pool)
        .await?;

        let id = JamId(row.get("id"));
        debug!("Inserted jam {}", id);
        Ok(Jam {
            id,
            community: jam.community,
            topic: jam.topic.clone(),
            tagline: jam.tagline.clone(),
            timezone: jam.timezone.clone(),
            windows: jam.windows,
            voting_open: false,
            registrations: BTreeSet::new(),
        })
    }

    async fn load_jam(&self, id: JamId) -> Result<Option<Jam>> {
        let mut conn = self.pool.acquire().await?;
        fetch_jam(&mut conn, id).await
    }

    async fn next_or_current_jam(
        &self,
        community: CommunityId,
        now: DateTime<Utc>,
    ) -> Result<Option<Jam>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM jams
            WHERE community_id = $1 AND voting_end > $2
            ORDER BY active_start ASC, id ASC
            LIMIT 1
            "#,
            JAM_COLUMNS
        ))
        .bind(community.as_i64())
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => {
                let id = JamId(row.get("id"));
                let registrations = fetch_registrations(&mut conn, id).await?;
                Ok(Some(jam_from_row(&row, registrations)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn set_voting(&self, jam: JamId, open: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE jams SET voting_open = $2 WHERE id = $1")
            .bind(jam.0)
            .bind(open)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn add_registration(&self, jam: JamId, user: UserId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM jams WHERE id = $1")
            .bind(jam.0)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Err(JamError::JamNotFound(jam));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO jam_registrations (jam_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (jam_id, user_id) DO NOTHING
            "#,
        )
        .bind(jam.0)
        .bind(user.as_i64())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_settings(&self, community: CommunityId) -> Result<Option<JamSettings>> {
        let row = sqlx::query(
            "SELECT community_id, jam_role_id, team_size FROM jam_settings WHERE community_id = $1",
        )
        .bind(community.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| JamSettings {
            community: CommunityId::from_i64(r.get("community_id")),
            jam_role: r.get::<Option<i64>, _>("jam_role_id").map(RoleId::from_i64),
            team_size: r.get::<i32, _>("team_size").max(1) as u32,
        }))
    }

    #[instrument(skip(self))]
    async fn save_settings(&self, settings: &JamSettings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jam_settings (community_id, jam_role_id, team_size)
            VALUES ($1, $2, $3)
            ON CONFLICT (community_id) DO UPDATE SET
                jam_role_id = EXCLUDED.jam_role_id,
                team_size = EXCLUDED.team_size,
                updated_at = NOW()
            "#,
        )
        .bind(settings.community.as_i64())
        .bind(settings.jam_role.map(|r| r.as_i64()))
        .bind(settings.team_size as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_team(&self, id: TeamId) -> Result<Option<Team>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(&format!("SELECT {} FROM teams WHERE id = $1", TEAM_COLUMNS))
            .bind(id.0)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => {
                let members = fetch_members(&mut conn, id).await?;
                Ok(Some(team_from_row(&row, members)))
            }
            None => Ok(None),
        }
    }

    async fn find_team_by_member(&self, jam: JamId, user: UserId) -> Result<Option<Team>> {
        let mut conn = self.pool.acquire().await?;
        fetch_team_where(
            &mut conn,
            "t.jam_id = $1 AND t.id = (SELECT m.team_id FROM team_members m WHERE m.jam_id = $1 AND m.user_id = $2)",
            jam,
            TeamFilterArg::User(user.as_i64()),
        )
        .await
    }

    async fn find_team_by_name(&self, jam: JamId, name: &str) -> Result<Option<Team>> {
        let mut conn = self.pool.acquire().await?;
        fetch_team_where(
            &mut conn,
            "t.jam_id = $1 AND t.name = $2",
            jam,
            TeamFilterArg::Name(name),
        )
        .await
    }

    async fn team_members(&self, team: TeamId) -> Result<BTreeSet<UserId>> {
        let mut conn = self.pool.acquire().await?;
        let exists = sqlx::query("SELECT 1 FROM teams WHERE id = $1")
            .bind(team.0)
            .fetch_optional(&mut *conn)
            .await?
            .is_some();
        if !exists {
            return Err(JamError::TeamNotFound(team));
        }
        fetch_members(&mut conn, team).await
    }

    async fn load_invite(&self, id: InviteId) -> Result<Option<Invite>> {
        let mut conn = self.pool.acquire().await?;
        fetch_invite(&mut conn, id).await
    }

    #[instrument(skip(self, keys), fields(keys = keys.len()))]
    async fn begin(&self, mut keys: Vec<LockKey>) -> Result<Box<dyn AtomicScope + '_>> {
        keys.sort();
        keys.dedup();

        let mut tx = self.pool.begin().await?;
        for key in &keys {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(key.as_key())
                .execute(&mut *tx)
                .await?;
        }
        debug!("Opened atomic scope over {} key(s)", keys.len());

        Ok(Box::new(PgScope { tx }))
    }
}

/// One transaction holding advisory locks until commit or rollback
struct PgScope {
    tx: Transaction<'static, Postgres>,
}

impl PgScope {
    async fn cancel_pending(
        &mut self,
        filter: &str,
        first: i64,
        second: i64,
        keep: Option<Uuid>,
    ) -> Result<Vec<InviteId>> {
        let sql = format!(
            r#"
            UPDATE invites SET status = 'cancelled', resolved_at = NOW()
            WHERE status = 'pending' AND {} AND ($3::uuid IS NULL OR id <> $3)
            RETURNING id
            "#,
            filter
        );
        let rows = sqlx::query(&sql)
            .bind(first)
            .bind(second)
            .bind(keep)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(rows
            .iter()
            .map(|r| InviteId(r.get::<Uuid, _>("id")))
            .collect())
    }
}

#[async_trait]
impl AtomicScope for PgScope {
    async fn load_jam(&mut self, id: JamId) -> Result<Option<Jam>> {
        fetch_jam(&mut *self.tx, id).await
    }

    async fn load_invite(&mut self, id: InviteId) -> Result<Option<Invite>> {
        fetch_invite(&mut *self.tx, id).await
    }

    async fn team_of(&mut self, jam: JamId, user: UserId) -> Result<Option<TeamId>> {
        let row = sqlx::query("SELECT team_id FROM team_members WHERE jam_id = $1 AND user_id = $2")
            .bind(jam.0)
            .bind(user.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(|r| TeamId(r.get("team_id"))))
    }

    async fn team_by_name(&mut self, jam: JamId, name: &str) -> Result<Option<TeamId>> {
        let row = sqlx::query("SELECT id FROM teams WHERE jam_id = $1 AND name = $2")
            .bind(jam.0)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(|r| TeamId(r.get("id"))))
    }

    async fn member_count(&mut self, team: TeamId) -> Result<usize> {
        let row = sqlx::query(
            r#"
            SELECT
                EXISTS (SELECT 1 FROM teams WHERE id = $1) AS team_exists,
                (SELECT COUNT(*) FROM team_members WHERE team_id = $1) AS members
            "#,
        )
        .bind(team.0)
        .fetch_one(&mut *self.tx)
        .await?;

        if !row.get::<bool, _>("team_exists") {
            return Err(JamError::TeamNotFound(team));
        }
        Ok(row.get::<i64, _>("members").max(0) as usize)
    }

    #[instrument(skip(self, team), fields(jam = %team.jam, name = %team.name))]
    async fn insert_team(&mut self, team: &NewTeam) -> Result<Team> {
        let row = sqlx::query(
            r#"
            INSERT INTO teams (jam_id, name, leader_id, role_id, text_channel_id, voice_channel_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(team.jam.0)
        .bind(&team.name)
        .bind(team.leader.as_i64())
        .bind(team.role.as_i64())
        .bind(team.text_channel.as_i64())
        .bind(team.voice_channel.as_i64())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| {
            if violated_constraint(&err).as_deref() == Some(UNIQUE_TEAM_NAME) {
                JamError::NameTaken(team.name.clone())
            } else {
                constraint_error(err)
            }
        })?;

        let id = TeamId(row.get("id"));
        self.add_member(team.jam, id, team.leader).await?;

        Ok(Team {
            id,
            jam: team.jam,
            name: team.name.clone(),
            leader: team.leader,
            role: team.role,
            text_channel: team.text_channel,
            voice_channel: team.voice_channel,
            members: BTreeSet::from([team.leader]),
        })
    }

    async fn add_member(&mut self, jam: JamId, team: TeamId, user: UserId) -> Result<()> {
        sqlx::query("INSERT INTO team_members (team_id, jam_id, user_id) VALUES ($1, $2, $3)")
            .bind(team.0)
            .bind(jam.0)
            .bind(user.as_i64())
            .execute(&mut *self.tx)
            .await
            .map_err(constraint_error)?;

        Ok(())
    }

    async fn insert_invite(&mut self, invite: &Invite) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invites (id, jam_id, team_id, inviter_id, invitee_id, issued_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(invite.id.0)
        .bind(invite.jam.0)
        .bind(invite.team.0)
        .bind(invite.inviter.as_i64())
        .bind(invite.invitee.as_i64())
        .bind(invite.issued_at)
        .bind(invite.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(constraint_error)?;

        Ok(())
    }

    async fn set_invite_status(&mut self, id: InviteId, status: InviteStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE invites SET
                status = $2,
                resolved_at = CASE WHEN $2 = 'pending' THEN NULL ELSE NOW() END
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(status.as_str())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JamError::InviteNotFound(id));
        }
        Ok(())
    }

    async fn cancel_pending_for_pair(
        &mut self,
        team: TeamId,
        invitee: UserId,
    ) -> Result<Vec<InviteId>> {
        self.cancel_pending("team_id = $1 AND invitee_id = $2", team.0, invitee.as_i64(), None)
            .await
    }

    async fn cancel_pending_for_invitee(
        &mut self,
        jam: JamId,
        invitee: UserId,
        keep: Option<InviteId>,
    ) -> Result<Vec<InviteId>> {
        self.cancel_pending(
            "jam_id = $1 AND invitee_id = $2",
            jam.0,
            invitee.as_i64(),
            keep.map(|id| id.0),
        )
        .await
    }

    async fn remove_registration(&mut self, jam: JamId, user: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jam_registrations WHERE jam_id = $1 AND user_id = $2")
            .bind(jam.0)
            .bind(user.as_i64())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
