use diesel::prelude::*;

use crate::database::schema::reaction_upload;

/// A guild-level "this trigger key plays that upload" binding.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = reaction_upload)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReactionBinding {
    pub guild_id: String,
    pub reaction_key: String,
    pub upload_name: String,
}

impl ReactionBinding {
    pub fn set(conn: &mut SqliteConnection, binding: &ReactionBinding) -> QueryResult<usize> {
        diesel::replace_into(reaction_upload::table)
            .values(binding)
            .execute(conn)
    }

    pub fn find_upload(
        conn: &mut SqliteConnection,
        guild_id: &str,
        reaction_key: &str,
    ) -> QueryResult<Option<String>> {
        reaction_upload::table
            .filter(reaction_upload::guild_id.eq(guild_id))
            .filter(reaction_upload::reaction_key.eq(reaction_key))
            .select(reaction_upload::upload_name)
            .first(conn)
            .optional()
    }

    pub fn list_for_guild(conn: &mut SqliteConnection, guild_id: &str) -> QueryResult<Vec<Self>> {
        reaction_upload::table
            .filter(reaction_upload::guild_id.eq(guild_id))
            .order((
                reaction_upload::reaction_key.asc(),
                reaction_upload::upload_name.asc(),
            ))
            .select(Self::as_select())
            .load(conn)
    }

    pub fn keys_for_upload(
        conn: &mut SqliteConnection,
        guild_id: &str,
        upload_name: &str,
    ) -> QueryResult<Vec<String>> {
        reaction_upload::table
            .filter(reaction_upload::guild_id.eq(guild_id))
            .filter(reaction_upload::upload_name.eq(upload_name))
            .order(reaction_upload::reaction_key.asc())
            .select(reaction_upload::reaction_key)
            .load(conn)
    }

    pub fn delete_for_upload(
        conn: &mut SqliteConnection,
        guild_id: &str,
        upload_name: &str,
    ) -> QueryResult<usize> {
        diesel::delete(reaction_upload::table)
            .filter(reaction_upload::guild_id.eq(guild_id))
            .filter(reaction_upload::upload_name.eq(upload_name))
            .execute(conn)
    }
}
