use ordo::{eyre, expand, Assertion, ParameterSet, RequestBuilder, Scenario};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: &'static str,
    pub first_name: &'static str,
    pub last_name: &'static str,
    pub email: &'static str,
    pub password: &'static str,
    pub phone: &'static str,
    pub user_status: i32,
}

/// Users created by [`create_users_with_list`]; later scenarios log in as and
/// delete exactly these.
pub fn users() -> Vec<User> {
    vec![
        User {
            id: 0,
            username: "Brud",
            first_name: "Rudolf",
            last_name: "Brayninger",
            email: "brayninger@example.com",
            password: "password123",
            phone: "1234567890",
            user_status: 0,
        },
        User {
            id: 1,
            username: "Michael",
            first_name: "Hm",
            last_name: "Mm",
            email: "gg@example.com",
            password: "password",
            phone: "123",
            user_status: 0,
        },
    ]
}

pub fn create_users_with_list() -> Scenario {
    Scenario::new(
        4,
        "create_users_with_list",
        RequestBuilder::post("/user/createWithList").json(&users()),
    )
    .expect(Assertion::status(200))
    .expect(Assertion::field_eq("code", 200))
    .expect(Assertion::field_eq("message", "ok"))
}

pub fn login() -> eyre::Result<Vec<Scenario>> {
    let template = Scenario::new(
        5,
        "login",
        RequestBuilder::get("/user/login")
            .query("username", "{username}")
            .query("password", "{password}"),
    )
    .expect(Assertion::status(200))
    .expect(Assertion::field_eq("code", 200))
    .expect(Assertion::field_contains("message", "logged in user session"));

    let mut rows = vec![["pass", "aa"]];
    rows.extend(users().iter().map(|u| [u.username, u.password]));
    Ok(expand(&template, &ParameterSet::rows(["username", "password"], rows))?)
}

pub fn delete_user() -> eyre::Result<Vec<Scenario>> {
    let template = Scenario::new(6, "delete_user", RequestBuilder::delete("/user/{username}"))
        .expect(Assertion::status(200));
    let usernames = users().into_iter().map(|u| u.username);
    Ok(expand(&template, &ParameterSet::values("username", usernames))?)
}

pub fn update_user() -> Scenario {
    let body = r#"{
  "id": 1,
  "username": "updatedUser",
  "firstName": "Updated",
  "lastName": "User",
  "email": "updateduser@example.com",
  "password": "newpassword123",
  "phone": "9876543210",
  "userStatus": 1
}"#;
    Scenario::new(
        7,
        "update_user",
        RequestBuilder::put("/user/testUser").body(body),
    )
    .expect(Assertion::status(200))
    .expect(Assertion::field_eq("code", 200))
}
