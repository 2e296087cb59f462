use ordo::{eyre, expand, Assertion, ParameterSet, Predicate, RequestBuilder, Scenario};

pub fn create_pet() -> Scenario {
    let body = r#"{
  "id": 0,
  "name": "doggie",
  "status": "available"
}"#;
    Scenario::new(1, "create_pet", RequestBuilder::post("/pet").body(body))
        .expect(Assertion::status(200))
        .expect(Assertion::field_eq("name", "doggie"))
        .extract("id", "petId")
}

/// Renames the pet created by [`create_pet`].
pub fn update_pet() -> Scenario {
    let body = r#"{
  "id": {petId},
  "category": {
    "id": 0,
    "name": "string"
  },
  "name": "EuroDog",
  "photoUrls": [
    "string"
  ],
  "tags": [
    {
      "id": 0,
      "name": "string"
    }
  ],
  "status": "pending"
}"#;
    Scenario::new(2, "update_pet", RequestBuilder::put("/pet").body(body))
        .expect(Assertion::status(200))
        .expect(Assertion::field_eq("name", "EuroDog"))
        .expect(Assertion::field_eq("status", "pending"))
}

pub fn find_pets_by_status() -> eyre::Result<Vec<Scenario>> {
    let template = Scenario::new(
        3,
        "find_pets_by_status",
        RequestBuilder::get("/pet/findByStatus").query("status", "{status}"),
    )
    .expect(Assertion::status(200))
    .expect(Assertion::non_empty("status"))
    .expect(Assertion::all(
        "status",
        Predicate::Equals("{status}".into()),
    ));

    Ok(expand(&template, &ParameterSet::values("status", ["pending"]))?)
}
