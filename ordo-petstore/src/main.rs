//! Acceptance scenarios for the Swagger Petstore sample service.
//!
//! ```text
//! cargo run -p ordo-petstore -- test
//! ```
mod pet;
mod user;

use ordo::{eyre, Scenario};

/// Every scenario of the suite, in declaration order.
pub fn scenarios() -> eyre::Result<Vec<Scenario>> {
    let mut scenarios = vec![pet::create_pet(), pet::update_pet()];
    scenarios.extend(pet::find_pets_by_status()?);
    scenarios.push(user::create_users_with_list());
    scenarios.extend(user::login()?);
    scenarios.extend(user::delete_user()?);
    scenarios.push(user::update_user());
    Ok(scenarios)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let app = ordo::App::new();
    app.run(scenarios()?).await?;
    Ok(())
}
