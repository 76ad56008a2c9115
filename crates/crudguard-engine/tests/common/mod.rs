//! In-memory store for exercising `CrudService`
//!
//! Holds three tables (`user`, `post`, `country`) with `post.authorId` and
//! `user.countryId` as foreign keys, and evaluates the typed filter tree
//! directly against materialised records.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use crudguard_core::errors::{ExError, ExErrorKind, Result};
use crudguard_core::joins::IncludeTree;
use crudguard_core::mutation::{RelationOp, ToOneWrite, WriteData};
use crudguard_core::query::where_node::is_operator_token;
use crudguard_core::query::{Combinator, OrderByNode, Qualifier, RelationFilter, SortDirection, WhereClause, WhereNode};
use crudguard_core::{EntityConfig, RelationSchema};
use crudguard_engine::{CrudService, FindArgs, PersistenceClient, RecordKey};

type Row = Map<String, Value>;

#[derive(Default)]
struct Tables {
    users: Vec<Row>,
    posts: Vec<Row>,
    countries: Vec<Row>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn posts_of(&self, user_id: &Value) -> Vec<Value> {
        self.posts
            .iter()
            .filter(|p| p.get("authorId") == Some(user_id))
            .map(|p| Value::Object(p.clone()))
            .collect()
    }

    fn country_of(&self, user: &Row) -> Value {
        let Some(country_id) = user.get("countryId").filter(|v| !v.is_null()) else {
            return Value::Null;
        };
        self.countries
            .iter()
            .find(|c| c.get("id") == Some(country_id))
            .map(|c| Value::Object(c.clone()))
            .unwrap_or(Value::Null)
    }

    /// `include = None` loads every relation (used for filter evaluation)
    fn materialise(&self, user: &Row, include: Option<&IncludeTree>) -> Value {
        let mut out = user.clone();
        let id = user.get("id").cloned().unwrap_or(Value::Null);
        if include.map_or(true, |t| t.child("posts").is_some()) {
            out.insert("posts".to_string(), Value::Array(self.posts_of(&id)));
        }
        if include.map_or(true, |t| t.child("country").is_some()) {
            out.insert("country".to_string(), self.country_of(user));
        }
        Value::Object(out)
    }

    fn matching(&self, filter: &WhereNode) -> Vec<Row> {
        self.users
            .iter()
            .filter(|u| eval_node(filter, &self.materialise(u, None)))
            .cloned()
            .collect()
    }

    fn apply(&mut self, user_id: &Value, data: &WriteData) {
        for (name, write) in &data.relations {
            match (name.as_str(), &write.op) {
                ("posts", RelationOp::ToMany(w)) => {
                    for id in &w.connect {
                        if let Some(post) = self.posts.iter_mut().find(|p| p.get("id") == Some(id)) {
                            post.insert("authorId".to_string(), user_id.clone());
                        }
                    }
                    for id in &w.disconnect {
                        if let Some(post) = self.posts.iter_mut().find(|p| p.get("id") == Some(id)) {
                            post.insert("authorId".to_string(), Value::Null);
                        }
                    }
                    self.posts.retain(|p| !w.delete.iter().any(|id| p.get("id") == Some(id)));
                    for entry in &w.create {
                        let mut post = entry.clone();
                        post.insert("id".to_string(), json!(self.next_id()));
                        post.insert("authorId".to_string(), user_id.clone());
                        self.posts.push(post);
                    }
                }
                ("country", RelationOp::ToOne(w)) => {
                    let country_id = match w {
                        ToOneWrite::Connect { id } => id.clone(),
                        ToOneWrite::Create { data } => {
                            let id = json!(self.next_id());
                            let mut country = data.clone();
                            country.insert("id".to_string(), id.clone());
                            self.countries.push(country);
                            id
                        }
                        ToOneWrite::Disconnect => Value::Null,
                        ToOneWrite::Delete => {
                            let current = self.user(user_id).and_then(|u| u.get("countryId").cloned());
                            self.countries.retain(|c| c.get("id") != current.as_ref());
                            Value::Null
                        }
                    };
                    if let Some(user) = self.user_mut(user_id) {
                        user.insert("countryId".to_string(), country_id);
                    }
                }
                (other, op) => panic!("unexpected relation write {} {:?}", other, op),
            }
        }
    }

    fn user(&self, id: &Value) -> Option<&Row> {
        self.users.iter().find(|u| u.get("id") == Some(id))
    }

    fn user_mut(&mut self, id: &Value) -> Option<&mut Row> {
        self.users.iter_mut().find(|u| u.get("id") == Some(id))
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_country(&self, name: &str) -> i64 {
        let mut t = self.tables.lock().unwrap();
        let id = t.next_id();
        t.countries.push(row(json!({"id": id, "name": name})));
        id
    }

    /// Insert a user from a JSON object of scalars; returns its id
    pub fn insert_user(&self, fields: Value) -> i64 {
        let mut t = self.tables.lock().unwrap();
        let id = t.next_id();
        let mut user = row(fields);
        user.insert("id".to_string(), json!(id));
        user.entry("countryId").or_insert(Value::Null);
        t.users.push(user);
        id
    }

    pub fn insert_post(&self, title: &str, author: Option<i64>) -> i64 {
        let mut t = self.tables.lock().unwrap();
        let id = t.next_id();
        t.posts.push(row(json!({"id": id, "title": title, "authorId": author})));
        id
    }

    /// Ids of posts whose author is `user_id`
    pub fn post_ids_of(&self, user_id: i64) -> Vec<i64> {
        let t = self.tables.lock().unwrap();
        let mut ids: Vec<i64> = t
            .posts_of(&json!(user_id))
            .iter()
            .filter_map(|p| p["id"].as_i64())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn post_exists(&self, post_id: i64) -> bool {
        let t = self.tables.lock().unwrap();
        t.posts.iter().any(|p| p.get("id") == Some(&json!(post_id)))
    }

    pub fn user_row(&self, user_id: i64) -> Option<Value> {
        let t = self.tables.lock().unwrap();
        t.user(&json!(user_id)).map(|u| Value::Object(u.clone()))
    }

    pub fn user_count(&self) -> usize {
        self.tables.lock().unwrap().users.len()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(AtomicOrdering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(AtomicOrdering::SeqCst)
    }

    fn check_model(model: &str) -> Result<()> {
        if model == "user" {
            Ok(())
        } else {
            Err(ExError::new(ExErrorKind::Persistence).with_message(format!("no table {}", model)))
        }
    }
}

#[async_trait]
impl PersistenceClient for InMemoryStore {
    async fn create(&self, model: &str, data: WriteData) -> Result<Value> {
        Self::check_model(model)?;
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        let mut t = self.tables.lock().unwrap();
        let id = json!(t.next_id());
        let mut user = data.scalars.clone();
        user.insert("id".to_string(), id.clone());
        user.insert("countryId".to_string(), Value::Null);
        t.users.push(user);
        t.apply(&id, &data);
        Ok(Value::Object(t.user(&id).cloned().unwrap_or_default()))
    }

    async fn find_first(&self, model: &str, args: FindArgs) -> Result<Option<Value>> {
        Self::check_model(model)?;
        self.reads.fetch_add(1, AtomicOrdering::SeqCst);
        let t = self.tables.lock().unwrap();
        Ok(t
            .matching(&args.filter)
            .first()
            .map(|u| t.materialise(u, Some(&args.include))))
    }

    async fn find_many(&self, model: &str, args: FindArgs) -> Result<Vec<Value>> {
        Self::check_model(model)?;
        self.reads.fetch_add(1, AtomicOrdering::SeqCst);
        let t = self.tables.lock().unwrap();
        let mut rows = t.matching(&args.filter);
        if let Some(order_by) = &args.order_by {
            rows.sort_by(|a, b| {
                for node in order_by.entries() {
                    if let OrderByNode::Field { field, direction } = node {
                        let ord = cmp_values(a.get(field), b.get(field));
                        let ord = match direction {
                            SortDirection::Asc => ord,
                            SortDirection::Desc => ord.reverse(),
                        };
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                }
                Ordering::Equal
            });
        }
        let skip = args.skip.unwrap_or(0) as usize;
        let take = args.take.map_or(usize::MAX, |t| t as usize);
        Ok(rows
            .iter()
            .skip(skip)
            .take(take)
            .map(|u| t.materialise(u, Some(&args.include)))
            .collect())
    }

    async fn count(&self, model: &str, filter: &WhereNode) -> Result<u64> {
        Self::check_model(model)?;
        self.reads.fetch_add(1, AtomicOrdering::SeqCst);
        let t = self.tables.lock().unwrap();
        Ok(t.matching(filter).len() as u64)
    }

    async fn update(&self, model: &str, key: &RecordKey, data: WriteData) -> Result<Value> {
        Self::check_model(model)?;
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        let mut t = self.tables.lock().unwrap();
        let user = t
            .user_mut(&key.value)
            .ok_or_else(|| ExError::new(ExErrorKind::NotFound))?;
        for (k, v) in &data.scalars {
            user.insert(k.clone(), v.clone());
        }
        t.apply(&key.value, &data);
        Ok(Value::Object(t.user(&key.value).cloned().unwrap_or_default()))
    }

    async fn delete(&self, model: &str, key: &RecordKey) -> Result<()> {
        Self::check_model(model)?;
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        let mut t = self.tables.lock().unwrap();
        let before = t.users.len();
        t.users.retain(|u| u.get(&key.field) != Some(&key.value));
        if t.users.len() == before {
            return Err(ExError::new(ExErrorKind::NotFound));
        }
        Ok(())
    }
}

/// Every call fails with a message that must never reach the caller
pub struct FailingStore;

fn leaky_failure() -> ExError {
    ExError::new(ExErrorKind::Persistence).with_message("connection refused: db-secret-host:5432")
}

#[async_trait]
impl PersistenceClient for FailingStore {
    async fn create(&self, _model: &str, _data: WriteData) -> Result<Value> {
        Err(leaky_failure())
    }

    async fn find_first(&self, _model: &str, _args: FindArgs) -> Result<Option<Value>> {
        Err(leaky_failure())
    }

    async fn find_many(&self, _model: &str, _args: FindArgs) -> Result<Vec<Value>> {
        Err(leaky_failure())
    }

    async fn count(&self, _model: &str, _filter: &WhereNode) -> Result<u64> {
        Err(leaky_failure())
    }

    async fn update(&self, _model: &str, _key: &RecordKey, _data: WriteData) -> Result<Value> {
        Err(leaky_failure())
    }

    async fn delete(&self, _model: &str, _key: &RecordKey) -> Result<()> {
        Err(leaky_failure())
    }
}

pub fn user_config() -> EntityConfig {
    EntityConfig::new("user")
        .with_allowed_joins(["posts", "country"])
        .with_default_joins(["country"])
        .with_forbidden_path("password")
        .with_scalars(["name", "email", "password", "tenantId"])
        .with_relation("posts", RelationSchema::to_many())
        .with_relation("country", RelationSchema::to_one())
}

pub fn user_service(store: Arc<InMemoryStore>) -> CrudService {
    CrudService::new(&user_config(), store).unwrap()
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

fn cmp_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn eval_node(node: &WhereNode, record: &Value) -> bool {
    node.clauses().iter().all(|clause| eval_clause(clause, record))
}

fn eval_clause(clause: &WhereClause, record: &Value) -> bool {
    match clause {
        WhereClause::Combinator { kind, operands, .. } => match kind {
            Combinator::And => operands.iter().all(|n| eval_node(n, record)),
            Combinator::Or => operands.iter().any(|n| eval_node(n, record)),
            Combinator::Not => !operands.iter().any(|n| eval_node(n, record)),
        },
        WhereClause::Relation { name, filter } => {
            let related = record.get(name).unwrap_or(&Value::Null);
            match filter {
                RelationFilter::Direct(body) => related.is_object() && eval_node(body, related),
                RelationFilter::Qualified(parts) => parts.iter().all(|(qualifier, body)| {
                    let matches = |v: &Value| body.as_ref().map_or(true, |b| eval_node(b, v));
                    let members = related.as_array().cloned().unwrap_or_default();
                    match qualifier {
                        Qualifier::Some => members.iter().any(matches),
                        Qualifier::Every => members.iter().all(matches),
                        Qualifier::None => !members.iter().any(matches),
                        Qualifier::Is => match body {
                            None => related.is_null(),
                            Some(_) => !related.is_null() && matches(related),
                        },
                        Qualifier::IsNot => match body {
                            None => !related.is_null(),
                            Some(_) => related.is_null() || !matches(related),
                        },
                    }
                }),
            }
        }
        WhereClause::Leaf { field, condition } => {
            eval_condition(record.get(field).unwrap_or(&Value::Null), condition)
        }
    }
}

fn eval_condition(actual: &Value, condition: &Value) -> bool {
    let Value::Object(ops) = condition else {
        return actual == condition;
    };
    if ops.is_empty() || !ops.keys().all(|k| is_operator_token(k)) {
        return actual == condition;
    }
    ops.iter().all(|(op, expected)| match op.as_str() {
        "equals" => actual == expected,
        "not" => !eval_condition(actual, expected),
        "in" => expected.as_array().is_some_and(|list| list.contains(actual)),
        "notIn" => expected.as_array().is_some_and(|list| !list.contains(actual)),
        "contains" => str_op(actual, expected, |a, e| a.contains(e)),
        "startsWith" => str_op(actual, expected, |a, e| a.starts_with(e)),
        "endsWith" => str_op(actual, expected, |a, e| a.ends_with(e)),
        "gt" => cmp_values(Some(actual), Some(expected)) == Ordering::Greater,
        "gte" => cmp_values(Some(actual), Some(expected)) != Ordering::Less,
        "lt" => cmp_values(Some(actual), Some(expected)) == Ordering::Less,
        "lte" => cmp_values(Some(actual), Some(expected)) != Ordering::Greater,
        "mode" => true,
        _ => false,
    })
}

fn str_op(actual: &Value, expected: &Value, f: impl Fn(&str, &str) -> bool) -> bool {
    match (actual.as_str(), expected.as_str()) {
        (Some(a), Some(e)) => f(a, e),
        _ => false,
    }
}
