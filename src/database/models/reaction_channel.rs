use diesel::prelude::*;

use crate::database::schema::reaction_channel;

/// Sentinel channel id meaning "every channel in this guild is off".
pub const ALL_OFF: &str = "0";

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = reaction_channel)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReactionChannel {
    pub guild_id: String,
    pub channel_id: String,
}

#[derive(Insertable)]
#[diesel(table_name = reaction_channel)]
struct NewReactionChannel<'a> {
    guild_id: &'a str,
    channel_id: &'a str,
}

impl ReactionChannel {
    pub fn for_guild(conn: &mut SqliteConnection, guild_id: &str) -> QueryResult<Vec<Self>> {
        reaction_channel::table
            .filter(reaction_channel::guild_id.eq(guild_id))
            .select(Self::as_select())
            .load(conn)
    }

    /// No rows: all on. Sentinel row: all off. Otherwise only the listed channels.
    pub fn is_enabled(
        conn: &mut SqliteConnection,
        guild_id: &str,
        channel_id: &str,
    ) -> QueryResult<bool> {
        let rows = Self::for_guild(conn, guild_id)?;
        if rows.is_empty() {
            return Ok(true);
        }
        if rows.iter().any(|r| r.channel_id == ALL_OFF) {
            return Ok(false);
        }
        Ok(rows.iter().any(|r| r.channel_id == channel_id))
    }

    pub fn set_all_off(conn: &mut SqliteConnection, guild_id: &str) -> QueryResult<()> {
        conn.transaction(|conn| {
            diesel::delete(reaction_channel::table)
                .filter(reaction_channel::guild_id.eq(guild_id))
                .execute(conn)?;
            diesel::replace_into(reaction_channel::table)
                .values(&NewReactionChannel {
                    guild_id,
                    channel_id: ALL_OFF,
                })
                .execute(conn)?;
            Ok(())
        })
    }

    pub fn set_all_on(conn: &mut SqliteConnection, guild_id: &str) -> QueryResult<usize> {
        diesel::delete(reaction_channel::table)
            .filter(reaction_channel::guild_id.eq(guild_id))
            .execute(conn)
    }

    /// Adds one channel to the allow-list, lifting an "all off" setting.
    pub fn set_channel_on(
        conn: &mut SqliteConnection,
        guild_id: &str,
        channel_id: &str,
    ) -> QueryResult<()> {
        conn.transaction(|conn| {
            diesel::delete(reaction_channel::table)
                .filter(reaction_channel::guild_id.eq(guild_id))
                .filter(reaction_channel::channel_id.eq(ALL_OFF))
                .execute(conn)?;
            diesel::replace_into(reaction_channel::table)
                .values(&NewReactionChannel {
                    guild_id,
                    channel_id,
                })
                .execute(conn)?;
            Ok(())
        })
    }
}
