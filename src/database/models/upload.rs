use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::database::schema::uploads;

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = uploads)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Upload {
    pub guild_id: String,
    pub name: String,
    pub file_path: String,
    pub uploaded_by: Option<String>,
    pub uploaded_at: Option<NaiveDateTime>,
}

#[derive(Insertable)]
#[diesel(table_name = uploads)]
pub struct NewUpload<'a> {
    pub guild_id: &'a str,
    pub name: &'a str,
    pub file_path: &'a str,
    pub uploaded_by: Option<&'a str>,
    pub uploaded_at: Option<NaiveDateTime>,
}

impl Upload {
    pub fn upsert(conn: &mut SqliteConnection, new: &NewUpload<'_>) -> QueryResult<usize> {
        diesel::replace_into(uploads::table)
            .values(new)
            .execute(conn)
    }

    pub fn find(
        conn: &mut SqliteConnection,
        guild_id: &str,
        name: &str,
    ) -> QueryResult<Option<Self>> {
        uploads::table
            .filter(uploads::guild_id.eq(guild_id))
            .filter(uploads::name.eq(name))
            .select(Self::as_select())
            .first(conn)
            .optional()
    }

    pub fn list_for_guild(conn: &mut SqliteConnection, guild_id: &str) -> QueryResult<Vec<Self>> {
        uploads::table
            .filter(uploads::guild_id.eq(guild_id))
            .order(uploads::name.asc())
            .select(Self::as_select())
            .load(conn)
    }

    pub fn delete(conn: &mut SqliteConnection, guild_id: &str, name: &str) -> QueryResult<usize> {
        diesel::delete(uploads::table)
            .filter(uploads::guild_id.eq(guild_id))
            .filter(uploads::name.eq(name))
            .execute(conn)
    }
}
