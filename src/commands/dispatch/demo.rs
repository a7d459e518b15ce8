//! A small application used by the dispatch command.
//!
//! Controllers: `site` (index, hello, not_found), `user` (index, view) and
//! the `admin` module with `stats`. User data lives in an in-memory SQLite
//! database seeded on startup.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::{
    ActiveRecord, ConnectionRegistry, DatabaseValue, DbError, FieldSpec, FieldType,
    OrderDirection, Queryable,
};
use crate::web::{
    ActionContext, ActionTable, Controller, DispatchError, HookPoint, Module, WebApplication,
};

const USERS: &[(i64, &str)] = &[(1, "zhj"), (2, "ann"), (3, "bob")];

pub const NOT_FOUND_ROUTE: &str = "site/not_found";

/// Seeded in-memory database with a `user` table.
pub fn seeded_registry() -> Result<ConnectionRegistry, DbError> {
    let registry = ConnectionRegistry::from_dsn("sqlite::memory:")?;
    let mut conn = registry.default_active_record()?;

    let mut forge = conn.forge();
    forge
        .add_field(FieldSpec::new("uid", FieldType::Int))
        .add_field(FieldSpec::new("username", FieldType::Varchar).constraint("50"))
        .add_key("uid", true);
    forge.create_table("user", true)?;

    for (uid, username) in USERS {
        conn.builder()
            .set("uid", *uid)
            .set("username", *username)
            .insert("user")?;
    }
    drop(conn);
    Ok(registry)
}

/// Build the demo application on top of `config`.
///
/// Without a configured 404 override, unknown routes go to
/// `site/not_found`.
pub fn application(config: AppConfig) -> Result<WebApplication, DispatchError> {
    let mut file = config.file().clone();
    if file.routes.override_404.is_empty() {
        file.routes.override_404 = NOT_FOUND_ROUTE.to_string();
    }

    let admin = Module::new("admin")
        .with_default_controller("stats")
        .with_controller("stats", || Box::new(StatsController::new()));
    let root = Module::new("app")
        .with_controller("site", || Box::new(SiteController::new()))
        .with_controller("user", || Box::new(UserController::new()))
        .with_module(admin);

    let registry = seeded_registry()?;
    let mut app = WebApplication::new(AppConfig::from_file(file), root)?
        .with_db(Arc::new(registry));
    app.hooks_mut().register(HookPoint::PostController, |ctx| {
        if let Some(route) = ctx.route {
            let route = route.to_string();
            ctx.response.set_header("X-Route", &route);
        }
        false
    });
    Ok(app)
}

macro_rules! dispatch_by_table {
    ($id:literal) => {
        fn id(&self) -> &str {
            $id
        }

        fn has_action(&self, method: &str) -> bool {
            self.actions.contains(method)
        }

        fn run_action(
            &mut self,
            method: &str,
            ctx: &mut ActionContext<'_>,
        ) -> Result<(), DispatchError> {
            let action = self.actions.resolve(method, ctx.route)?;
            action(self, ctx)
        }
    };
}

struct SiteController {
    actions: ActionTable<Self>,
}

impl SiteController {
    fn new() -> Self {
        Self {
            actions: ActionTable::new()
                .action("index", Self::index)
                .action("hello", Self::hello)
                .action("not_found", Self::not_found),
        }
    }

    fn index(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError> {
        let users = ctx.urls.create_url("user/index", &[], None);
        ctx.render(&format!("Welcome. Users: {}", users));
        Ok(())
    }

    fn hello(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError> {
        let name = ctx.param(0).unwrap_or("world").to_string();
        ctx.render(&format!("Hello, {}!", name));
        Ok(())
    }

    fn not_found(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError> {
        ctx.response.set_status(404);
        let path = ctx.uri.uri_string().to_string();
        ctx.render(&format!("Nothing here: /{}", path));
        Ok(())
    }
}

impl Controller for SiteController {
    dispatch_by_table!("site");
}

struct UserController {
    actions: ActionTable<Self>,
}

impl UserController {
    fn new() -> Self {
        Self {
            actions: ActionTable::new()
                .action("index", Self::index)
                .action("view", Self::view),
        }
    }

    fn index(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError> {
        let mut conn = ctx.active_record()?;
        let users = conn
            .builder()
            .select("uid, username")
            .from("user")
            .order_by("uid", OrderDirection::Asc)
            .get()?;

        let lines: Vec<String> = users
            .result_array()
            .iter()
            .map(|row| {
                let uid = row.get("uid").map(|v| v.as_i64_or(0)).unwrap_or_default();
                let name = row.get("username").map(|v| v.as_string_or("")).unwrap_or_default();
                let id = uid.to_string();
                let link = ctx.urls.create_url("user/view", &[("id", id.as_str())], None);
                format!("{} {} {}", uid, name, link)
            })
            .collect();
        ctx.render(&lines.join("\n"));
        Ok(())
    }

    /// `/user/view/id/<uid>` or `/user/view/<uid>`.
    fn view(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError> {
        let named = ctx.named_params();
        let uid = named
            .get("id")
            .cloned()
            .flatten()
            .or_else(|| ctx.param(0).map(str::to_string))
            .and_then(|s| s.parse::<i64>().ok());
        let Some(uid) = uid else {
            ctx.response.set_status(400);
            ctx.render("Missing user id");
            return Ok(());
        };

        let mut conn = ctx.active_record()?;
        let found = conn
            .builder()
            .select("username")
            .from("user")
            .where_("uid", uid)
            .get()?;
        match found.row_array(0).and_then(|row| row.get("username")) {
            Some(name) => ctx.render(&format!("User {}: {}", uid, name)),
            None => {
                ctx.response.set_status(404);
                ctx.render(&format!("No user {}", uid));
            }
        }
        Ok(())
    }
}

impl Controller for UserController {
    dispatch_by_table!("user");
}

struct StatsController {
    actions: ActionTable<Self>,
}

impl StatsController {
    fn new() -> Self {
        Self {
            actions: ActionTable::new().action("index", Self::index),
        }
    }

    fn index(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError> {
        let count = ctx.db()?.default_connection()?.count_all("user")?;
        ctx.render(&format!("users: {}", count));
        Ok(())
    }
}

impl Controller for StatsController {
    dispatch_by_table!("stats");
}
