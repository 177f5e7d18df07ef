//! Rule-based requirement decomposition
//!
//! Requirements are classified by keyword into class creation, REST resource
//! scaffolding, configuration, or a generic fallback. Each rule emits tasks
//! whose `save-file` calls carry fully rendered file content, so the static
//! engine can run them without any further decisions.

use once_cell::sync::Lazy;
use regex::Regex;

use super::graph;
use super::task::Task;
use crate::context::ProjectContext;
use crate::tools::{ToolCall, ValidationResult};

const DEFAULT_PORT: u16 = 8080;
const PLAN_FILE: &str = "taskforge-plan.md";

/// Capitalized words that never name the entity
const NON_ENTITY_WORDS: &[&str] = &[
    "create", "add", "build", "make", "implement", "generate", "write", "please", "a", "an",
    "the", "simple", "new", "data", "class", "kotlin", "java", "spring", "with", "for", "and",
];

const REST_WORDS: &[&str] = &[
    "rest", "api", "endpoint", "endpoints", "controller", "crud", "resource",
];
const CLASS_WORDS: &[&str] = &["class", "entity", "model", "dto", "record"];
const CONFIG_WORDS: &[&str] = &["config", "configuration", "configure", "settings", "yml", "yaml"];

static PROPERTY_LIST: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)\bwith\s+(.+?)\s+(?:properties|property|fields|field|attributes|attribute)\b")
        .ok()
});
static PORT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\bport\s*(?:=|:|of|to)?\s*(\d{2,5})\b").ok());
static KOTLIN_STRING_FIELD: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\b(?:val|var)\s+(\w+)\s*:\s*String\b").ok());
static JAVA_STRING_FIELD: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"private\s+(?:final\s+)?String\s+(\w+);").ok());
static KOTLIN_VAR: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\bvar\b").ok());
static JAVA_SETTER: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"\n    public void set\w+\([^)]*\) \{\n        this\.\w+ = \w+;\n    \}\n").ok()
});
static JAVA_NO_ARG_CTOR: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\n    public \w+\(\) \{\n    \}\n").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequirementKind {
    Class,
    RestResource,
    Configuration,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceLang {
    Kotlin,
    Java,
}

impl SourceLang {
    fn from_context(ctx: &ProjectContext) -> Self {
        if ctx.is_java() {
            SourceLang::Java
        } else {
            SourceLang::Kotlin
        }
    }

    fn dir(self) -> &'static str {
        match self {
            SourceLang::Kotlin => "kotlin",
            SourceLang::Java => "java",
        }
    }

    fn ext(self) -> &'static str {
        match self {
            SourceLang::Kotlin => "kt",
            SourceLang::Java => "java",
        }
    }

    fn package_line(self, package: &str) -> String {
        match self {
            SourceLang::Kotlin => format!("package {}\n\n", package),
            SourceLang::Java => format!("package {};\n\n", package),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropType {
    Long,
    Int,
    Double,
    Bool,
    Str,
}

impl PropType {
    fn infer(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower == "id" || name.ends_with("Id") {
            PropType::Long
        } else if ["age", "count", "quantity", "stock", "year", "size"]
            .iter()
            .any(|s| lower.ends_with(s))
        {
            PropType::Int
        } else if ["price", "amount", "total", "balance", "rating", "salary"]
            .iter()
            .any(|s| lower.ends_with(s))
        {
            PropType::Double
        } else if (lower.starts_with("is") && name.len() > 2)
            || lower.starts_with("has")
            || ["active", "enabled", "verified", "deleted"].contains(&lower.as_str())
        {
            PropType::Bool
        } else {
            PropType::Str
        }
    }

    fn name(self, lang: SourceLang) -> &'static str {
        match (self, lang) {
            (PropType::Long, _) => "Long",
            (PropType::Int, SourceLang::Kotlin) => "Int",
            (PropType::Int, SourceLang::Java) => "Integer",
            (PropType::Double, _) => "Double",
            (PropType::Bool, _) => "Boolean",
            (PropType::Str, _) => "String",
        }
    }

    fn sample(self, prop: &str) -> String {
        match self {
            PropType::Long => "1L".to_string(),
            PropType::Int => "1".to_string(),
            PropType::Double => "1.0".to_string(),
            PropType::Bool => "true".to_string(),
            PropType::Str => format!("\"{}\"", prop),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Property {
    name: String,
    ty: PropType,
}

/// Everything the templates need, extracted once per requirement
struct Blueprint<'a> {
    entity: String,
    properties: Vec<Property>,
    lang: SourceLang,
    ctx: &'a ProjectContext,
}

impl Blueprint<'_> {
    fn source_path(&self, package: Option<&str>, file_stem: &str) -> String {
        let mut parts = Vec::new();
        if self.ctx.uses_standard_layout() {
            parts.push(format!("src/main/{}", self.lang.dir()));
        }
        if let Some(package) = package {
            parts.push(package.to_string());
        }
        parts.push(format!("{}.{}", file_stem, self.lang.ext()));
        parts.join("/")
    }

    fn test_path(&self, package: &str, file_stem: &str) -> String {
        let root = if self.ctx.uses_standard_layout() {
            format!("src/test/{}", self.lang.dir())
        } else {
            "test".to_string()
        };
        format!("{}/{}/{}.{}", root, package, file_stem, self.lang.ext())
    }

    fn string_properties(&self) -> Vec<&Property> {
        self.properties
            .iter()
            .filter(|p| p.ty == PropType::Str)
            .collect()
    }

    fn route(&self) -> String {
        format!("/api/{}s", self.entity.to_ascii_lowercase())
    }

    fn sample_args(&self) -> String {
        self.properties
            .iter()
            .map(|p| match self.lang {
                SourceLang::Kotlin => format!("{} = {}", p.name, p.ty.sample(&p.name)),
                SourceLang::Java => p.ty.sample(&p.name),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Turns requirement text into an ordered, dependency-annotated task list
#[derive(Debug, Default, Clone)]
pub struct TaskDecomposer;

impl TaskDecomposer {
    pub fn new() -> Self {
        Self
    }

    /// Decompose a requirement. Blank requirements produce no tasks.
    pub fn decompose(&self, requirement: &str, ctx: &ProjectContext) -> Vec<Task> {
        let requirement = requirement.trim();
        if requirement.is_empty() {
            return Vec::new();
        }

        let words = words(requirement);
        let kind = classify(&words);
        let blueprint = Blueprint {
            entity: extract_entity(requirement, &words),
            properties: extract_properties(requirement),
            lang: SourceLang::from_context(ctx),
            ctx,
        };

        let tasks = match kind {
            RequirementKind::Class => class_tasks(requirement, &words, &blueprint),
            RequirementKind::RestResource => rest_tasks(&words, &blueprint),
            RequirementKind::Configuration => config_tasks(requirement, &words, ctx),
            RequirementKind::Generic => generic_tasks(requirement),
        };

        tracing::info!(
            kind = ?kind,
            entity = %blueprint.entity,
            task_count = tasks.len(),
            "Decomposed requirement"
        );
        tasks
    }

    pub fn validate_task_sequence(&self, tasks: &[Task]) -> ValidationResult {
        graph::validate_task_sequence(tasks)
    }

    /// Return a copy of `task` with `feedback` folded in. Known feedback
    /// patterns rewrite generated file content; everything else only
    /// annotates the description.
    pub fn refine_task(&self, task: &Task, feedback: &str) -> Task {
        let feedback = feedback.trim();
        let mut refined = task.clone();
        if feedback.is_empty() {
            return refined;
        }
        refined.description = format!("{} (feedback: {})", task.description, feedback);

        let lower = feedback.to_lowercase();
        let wants_validation = lower.contains("validation") || lower.contains("validate");
        let wants_immutable = lower.contains("immutable");
        if !wants_validation && !wants_immutable {
            return refined;
        }

        refined.tool_calls = task
            .tool_calls
            .iter()
            .map(|call| {
                let (Some(path), Some(content)) = (call.param_str("path"), call.param_str("file_content")) else {
                    return call.clone();
                };
                let is_java = path.ends_with(".java");
                let mut content = content.to_string();
                if wants_immutable {
                    content = make_immutable(&content, is_java);
                }
                if wants_validation {
                    content = add_validation(&content, is_java);
                }
                call.clone().with_param("file_content", content)
            })
            .collect();
        refined
    }
}

fn words(requirement: &str) -> Vec<String> {
    requirement
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn has_any(words: &[String], needles: &[&str]) -> bool {
    words
        .iter()
        .any(|w| needles.contains(&w.to_lowercase().as_str()))
}

fn classify(words: &[String]) -> RequirementKind {
    if has_any(words, REST_WORDS) {
        RequirementKind::RestResource
    } else if has_any(words, CLASS_WORDS) {
        RequirementKind::Class
    } else if has_any(words, CONFIG_WORDS) {
        RequirementKind::Configuration
    } else {
        RequirementKind::Generic
    }
}

fn extract_entity(requirement: &str, words: &[String]) -> String {
    let capitalized = words.iter().find(|w| {
        let starts_upper = w.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        let acronym = w.len() > 1 && w.chars().all(|c| c.is_ascii_uppercase());
        starts_upper
            && !acronym
            && w.chars().all(|c| c.is_ascii_alphanumeric())
            && !NON_ENTITY_WORDS.contains(&w.to_lowercase().as_str())
    });
    if let Some(word) = capitalized {
        return singularize(word);
    }

    // "a REST API for products" style: take the word after a marker
    let lower: Vec<String> = requirement
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_lowercase()
        })
        .collect();
    lower
        .windows(2)
        .find(|pair| ["for", "class", "entity", "model", "managing"].contains(&pair[0].as_str()))
        .map(|pair| pair[1].as_str())
        .filter(|w| !w.is_empty() && !NON_ENTITY_WORDS.contains(w))
        .map(|w| singularize(&capitalize(w)))
        .unwrap_or_else(|| "Item".to_string())
}

fn extract_properties(requirement: &str) -> Vec<Property> {
    let list = (*PROPERTY_LIST)
        .as_ref()
        .and_then(|re| re.captures(requirement))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    let names: Vec<String> = match list {
        Some(list) => list
            .replace(" and ", ",")
            .split(',')
            .filter_map(|chunk| {
                let parts: Vec<&str> = chunk
                    .split_whitespace()
                    .filter(|w| !["a", "an", "the"].contains(&w.to_lowercase().as_str()))
                    .collect();
                let name = camel_case(&parts);
                name.chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic())
                    .then_some(name)
            })
            .collect(),
        None => vec!["id".to_string(), "name".to_string()],
    };

    let mut seen = std::collections::HashSet::new();
    names
        .into_iter()
        .filter(|n| seen.insert(n.clone()))
        .map(|name| Property {
            ty: PropType::infer(&name),
            name,
        })
        .collect()
}

fn camel_case(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '_'))
        .filter(|w| !w.is_empty())
        .enumerate()
        .map(|(i, w)| {
            if i == 0 {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_lowercase().chain(chars).collect(),
                    None => String::new(),
                }
            } else {
                capitalize(w)
            }
        })
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn singularize(word: &str) -> String {
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("%{}%", key), value)
    })
}

fn save_file(path: String, content: String) -> ToolCall {
    ToolCall::new("save-file")
        .with_param("path", path.clone())
        .with_param("file_content", content)
        .with_expected_result(format!("{} written", path))
}

// ---------------------------------------------------------------------------
// Class rule
// ---------------------------------------------------------------------------

fn class_tasks(requirement: &str, words: &[String], bp: &Blueprint<'_>) -> Vec<Task> {
    let data_class = requirement.to_lowercase().contains("data class")
        || has_any(words, &["dto", "record", "immutable"]);
    let content = model_source(bp, None, data_class);
    let path = bp.source_path(None, &bp.entity);

    vec![Task::new(
        format!("create-{}-class", bp.entity.to_ascii_lowercase()),
        format!("Create class {} in {}", bp.entity, path),
    )
    .with_call(save_file(path, content))
    .with_priority(1)]
}

fn model_source(bp: &Blueprint<'_>, package: Option<&str>, immutable: bool) -> String {
    let mut out = package
        .map(|p| bp.lang.package_line(p))
        .unwrap_or_default();
    match bp.lang {
        SourceLang::Kotlin => {
            let keyword = if immutable { "val" } else { "var" };
            let prefix = if immutable { "data class" } else { "class" };
            out.push_str(&format!("{} {}(\n", prefix, bp.entity));
            for p in &bp.properties {
                out.push_str(&format!(
                    "    {} {}: {},\n",
                    keyword,
                    p.name,
                    p.ty.name(bp.lang)
                ));
            }
            out.push_str(")\n");
        }
        SourceLang::Java => {
            out.push_str(&java_bean(bp));
            if immutable {
                out = make_immutable(&out, true);
            }
        }
    }
    out
}

fn java_bean(bp: &Blueprint<'_>) -> String {
    let entity = &bp.entity;
    let mut out = format!("public class {} {{\n", entity);
    for p in &bp.properties {
        out.push_str(&format!("    private {} {};\n", p.ty.name(bp.lang), p.name));
    }
    out.push_str(&format!("\n    public {}() {{\n    }}\n", entity));

    let args: Vec<String> = bp
        .properties
        .iter()
        .map(|p| format!("{} {}", p.ty.name(bp.lang), p.name))
        .collect();
    out.push_str(&format!("\n    public {}({}) {{\n", entity, args.join(", ")));
    for p in &bp.properties {
        out.push_str(&format!("        this.{0} = {0};\n", p.name));
    }
    out.push_str("    }\n");

    for p in &bp.properties {
        let ty = p.ty.name(bp.lang);
        let cap = capitalize(&p.name);
        out.push_str(&format!(
            "\n    public {} get{}() {{\n        return {};\n    }}\n",
            ty, cap, p.name
        ));
        out.push_str(&format!(
            "\n    public void set{}({} {}) {{\n        this.{} = {};\n    }}\n",
            cap, ty, p.name, p.name, p.name
        ));
    }
    out.push_str("}\n");
    out
}

// ---------------------------------------------------------------------------
// REST resource rule
// ---------------------------------------------------------------------------

fn rest_tasks(words: &[String], bp: &Blueprint<'_>) -> Vec<Task> {
    let entity = bp.entity.as_str();
    let lower = entity.to_ascii_lowercase();
    let route = bp.route();
    let vars: [(&str, &str); 2] = [("ENTITY", entity), ("ROUTE", &route)];

    let (service_tpl, controller_tpl, test_tpl) = match bp.lang {
        SourceLang::Kotlin => (KOTLIN_SERVICE, KOTLIN_CONTROLLER, KOTLIN_SERVICE_TEST),
        SourceLang::Java => (JAVA_SERVICE, JAVA_CONTROLLER, JAVA_SERVICE_TEST),
    };

    let model_id = format!("{}-model", lower);
    let service_id = format!("{}-service", lower);
    let controller_id = format!("{}-controller", lower);

    let mut tasks = vec![
        Task::new(model_id.clone(), format!("Create {} model", entity))
            .with_call(save_file(
                bp.source_path(Some("model"), entity),
                model_source(bp, Some("model"), true),
            ))
            .with_priority(1),
        Task::new(service_id.clone(), format!("Create {}Service", entity))
            .with_call(save_file(
                bp.source_path(Some("service"), &format!("{}Service", entity)),
                render(service_tpl, &vars),
            ))
            .depends_on(model_id.clone())
            .with_priority(2),
        Task::new(
            controller_id.clone(),
            format!("Create {}Controller serving {}", entity, route),
        )
        .with_call(save_file(
            bp.source_path(Some("controller"), &format!("{}Controller", entity)),
            render(controller_tpl, &vars),
        ))
        .depends_on(service_id.clone())
        .with_priority(3),
    ];

    if has_any(words, &["validation", "validate", "validated"]) {
        tasks.push(
            Task::new(
                format!("{}-validation", lower),
                format!("Add {}Validator", entity),
            )
            .with_call(save_file(
                bp.source_path(Some("validation"), &format!("{}Validator", entity)),
                validator_source(bp),
            ))
            .depends_on(model_id.clone())
            .depends_on(controller_id.clone())
            .with_priority(4),
        );
    }

    if has_any(words, &["test", "tests", "tested", "testing"]) {
        let sample = bp.sample_args();
        let test_vars: [(&str, &str); 2] = [("ENTITY", entity), ("SAMPLE", &sample)];
        tasks.push(
            Task::new(format!("{}-tests", lower), format!("Add {}Service tests", entity))
                .with_call(save_file(
                    bp.test_path("service", &format!("{}ServiceTest", entity)),
                    render(test_tpl, &test_vars),
                ))
                .depends_on(service_id)
                .depends_on(controller_id)
                .with_priority(5),
        );
    }

    tasks
}

fn validator_source(bp: &Blueprint<'_>) -> String {
    let entity = &bp.entity;
    match bp.lang {
        SourceLang::Kotlin => {
            let mut checks = String::new();
            for p in bp.string_properties() {
                checks.push_str(&format!(
                    "        if (item.{0}.isBlank()) errors.add(\"{0} must not be blank\")\n",
                    p.name
                ));
            }
            format!(
                "package validation\n\nimport model.{e}\n\nobject {e}Validator {{\n    \
                 fun validate(item: {e}): List<String> {{\n        \
                 val errors = mutableListOf<String>()\n{checks}        return errors\n    }}\n}}\n",
                e = entity,
                checks = checks
            )
        }
        SourceLang::Java => {
            let mut checks = String::new();
            for p in bp.string_properties() {
                checks.push_str(&format!(
                    "        if (item.get{cap}() == null || item.get{cap}().isBlank()) {{\n            \
                     errors.add(\"{name} must not be blank\");\n        }}\n",
                    cap = capitalize(&p.name),
                    name = p.name
                ));
            }
            format!(
                "package validation;\n\nimport java.util.ArrayList;\nimport java.util.List;\n\
                 import model.{e};\n\npublic final class {e}Validator {{\n    \
                 public static List<String> validate({e} item) {{\n        \
                 List<String> errors = new ArrayList<>();\n{checks}        return errors;\n    }}\n}}\n",
                e = entity,
                checks = checks
            )
        }
    }
}

const KOTLIN_SERVICE: &str = r#"package service

import model.%ENTITY%

class %ENTITY%Service {
    private val items = mutableMapOf<Long, %ENTITY%>()
    private var nextId = 1L

    fun findAll(): List<%ENTITY%> = items.values.toList()

    fun findById(id: Long): %ENTITY%? = items[id]

    fun create(item: %ENTITY%): %ENTITY% {
        items[nextId++] = item
        return item
    }

    fun update(id: Long, item: %ENTITY%): %ENTITY%? {
        if (!items.containsKey(id)) return null
        items[id] = item
        return item
    }

    fun delete(id: Long): Boolean = items.remove(id) != null
}
"#;

const KOTLIN_CONTROLLER: &str = r#"package controller

import model.%ENTITY%
import org.springframework.http.ResponseEntity
import org.springframework.web.bind.annotation.*
import service.%ENTITY%Service

@RestController
@RequestMapping("%ROUTE%")
class %ENTITY%Controller(private val service: %ENTITY%Service) {

    @GetMapping
    fun list(): List<%ENTITY%> = service.findAll()

    @GetMapping("/{id}")
    fun get(@PathVariable id: Long): ResponseEntity<%ENTITY%> =
        service.findById(id)?.let { ResponseEntity.ok(it) } ?: ResponseEntity.notFound().build()

    @PostMapping
    fun create(@RequestBody item: %ENTITY%): %ENTITY% = service.create(item)

    @PutMapping("/{id}")
    fun update(@PathVariable id: Long, @RequestBody item: %ENTITY%): ResponseEntity<%ENTITY%> =
        service.update(id, item)?.let { ResponseEntity.ok(it) } ?: ResponseEntity.notFound().build()

    @DeleteMapping("/{id}")
    fun delete(@PathVariable id: Long): ResponseEntity<Void> =
        if (service.delete(id)) ResponseEntity.noContent().build() else ResponseEntity.notFound().build()
}
"#;

const KOTLIN_SERVICE_TEST: &str = r#"package service

import model.%ENTITY%
import kotlin.test.Test
import kotlin.test.assertEquals
import kotlin.test.assertNotNull
import kotlin.test.assertTrue

class %ENTITY%ServiceTest {
    private val service = %ENTITY%Service()

    @Test
    fun `create then find`() {
        service.create(%ENTITY%(%SAMPLE%))
        assertNotNull(service.findById(1L))
        assertEquals(1, service.findAll().size)
    }

    @Test
    fun `delete removes item`() {
        service.create(%ENTITY%(%SAMPLE%))
        assertTrue(service.delete(1L))
        assertEquals(0, service.findAll().size)
    }
}
"#;

const JAVA_SERVICE: &str = r#"package service;

import java.util.ArrayList;
import java.util.HashMap;
import java.util.List;
import java.util.Map;
import java.util.Optional;
import model.%ENTITY%;

public class %ENTITY%Service {
    private final Map<Long, %ENTITY%> items = new HashMap<>();
    private long nextId = 1;

    public List<%ENTITY%> findAll() {
        return new ArrayList<>(items.values());
    }

    public Optional<%ENTITY%> findById(long id) {
        return Optional.ofNullable(items.get(id));
    }

    public %ENTITY% create(%ENTITY% item) {
        items.put(nextId++, item);
        return item;
    }

    public Optional<%ENTITY%> update(long id, %ENTITY% item) {
        if (!items.containsKey(id)) {
            return Optional.empty();
        }
        items.put(id, item);
        return Optional.of(item);
    }

    public boolean delete(long id) {
        return items.remove(id) != null;
    }
}
"#;

const JAVA_CONTROLLER: &str = r#"package controller;

import java.util.List;
import model.%ENTITY%;
import org.springframework.http.ResponseEntity;
import org.springframework.web.bind.annotation.*;
import service.%ENTITY%Service;

@RestController
@RequestMapping("%ROUTE%")
public class %ENTITY%Controller {
    private final %ENTITY%Service service;

    public %ENTITY%Controller(%ENTITY%Service service) {
        this.service = service;
    }

    @GetMapping
    public List<%ENTITY%> list() {
        return service.findAll();
    }

    @GetMapping("/{id}")
    public ResponseEntity<%ENTITY%> get(@PathVariable long id) {
        return service.findById(id).map(ResponseEntity::ok).orElse(ResponseEntity.notFound().build());
    }

    @PostMapping
    public %ENTITY% create(@RequestBody %ENTITY% item) {
        return service.create(item);
    }

    @PutMapping("/{id}")
    public ResponseEntity<%ENTITY%> update(@PathVariable long id, @RequestBody %ENTITY% item) {
        return service.update(id, item).map(ResponseEntity::ok).orElse(ResponseEntity.notFound().build());
    }

    @DeleteMapping("/{id}")
    public ResponseEntity<Void> delete(@PathVariable long id) {
        return service.delete(id) ? ResponseEntity.noContent().build() : ResponseEntity.notFound().build();
    }
}
"#;

const JAVA_SERVICE_TEST: &str = r#"package service;

import static org.junit.jupiter.api.Assertions.assertEquals;
import static org.junit.jupiter.api.Assertions.assertTrue;

import model.%ENTITY%;
import org.junit.jupiter.api.Test;

class %ENTITY%ServiceTest {
    private final %ENTITY%Service service = new %ENTITY%Service();

    @Test
    void createThenFind() {
        service.create(new %ENTITY%(%SAMPLE%));
        assertTrue(service.findById(1L).isPresent());
        assertEquals(1, service.findAll().size());
    }

    @Test
    void deleteRemovesItem() {
        service.create(new %ENTITY%(%SAMPLE%));
        assertTrue(service.delete(1L));
        assertEquals(0, service.findAll().size());
    }
}
"#;

// ---------------------------------------------------------------------------
// Configuration and fallback rules
// ---------------------------------------------------------------------------

fn config_tasks(requirement: &str, words: &[String], ctx: &ProjectContext) -> Vec<Task> {
    let port = (*PORT)
        .as_ref()
        .and_then(|re| re.captures(requirement))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let mut content = format!("server:\n  port: {}\n", port);
    if has_any(words, &["database", "datasource", "db"]) {
        content.push_str(
            "\nspring:\n  datasource:\n    url: jdbc:h2:mem:app\n    username: sa\n    password: \"\"\n",
        );
    }
    if has_any(words, &["logging", "log", "logs"]) {
        content.push_str("\nlogging:\n  level:\n    root: INFO\n");
    }

    let path = if ctx.uses_standard_layout() {
        "src/main/resources/application.yml".to_string()
    } else {
        "application.yml".to_string()
    };

    vec![Task::new(
        "configure-application",
        format!("Write application configuration to {}", path),
    )
    .with_call(save_file(path, content))
    .with_priority(1)]
}

fn generic_tasks(requirement: &str) -> Vec<Task> {
    let plan = format!(
        "# Plan\n\n## Requirement\n\n{}\n\n## Steps\n\n1. Review the project layout\n\
         2. Identify the files the requirement touches\n3. Implement and verify the change\n",
        requirement
    );
    vec![
        Task::new("analyze-project", "Inspect the project layout")
            .with_call(
                ToolCall::new("view")
                    .with_param("path", ".")
                    .with_param("type", "directory"),
            )
            .with_priority(1),
        Task::new("write-plan", format!("Record a plan in {}", PLAN_FILE))
            .with_call(save_file(PLAN_FILE.to_string(), plan))
            .depends_on("analyze-project")
            .with_priority(2),
    ]
}

// ---------------------------------------------------------------------------
// Refinement rewrites
// ---------------------------------------------------------------------------

fn make_immutable(content: &str, is_java: bool) -> String {
    if is_java {
        let mut out = content.to_string();
        for pattern in [&JAVA_SETTER, &JAVA_NO_ARG_CTOR] {
            if let Some(re) = (**pattern).as_ref() {
                out = re.replace_all(&out, "\n").into_owned();
            }
        }
        let out = out.replace("    private final ", "    private ");
        let out = out.replace("    private ", "    private final ");
        return collapse_blank_runs(&out);
    }
    match (*KOTLIN_VAR).as_ref() {
        Some(re) => re.replace_all(content, "val").into_owned(),
        None => content.to_string(),
    }
}

fn add_validation(content: &str, is_java: bool) -> String {
    let pattern = if is_java {
        &JAVA_STRING_FIELD
    } else {
        &KOTLIN_STRING_FIELD
    };
    let Some(re) = (**pattern).as_ref() else {
        return content.to_string();
    };
    let fields: Vec<String> = re
        .captures_iter(content)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect();
    if fields.is_empty() {
        return content.to_string();
    }

    if is_java {
        if content.contains("void validate()") {
            return content.to_string();
        }
        let mut block = String::from("\n    public void validate() {\n");
        for f in &fields {
            block.push_str(&format!(
                "        if ({0} == null || {0}.isBlank()) {{\n            \
                 throw new IllegalArgumentException(\"{0} must not be blank\");\n        }}\n",
                f
            ));
        }
        block.push_str("    }\n");
        return insert_before_closing_brace(content, &block);
    }

    if content.contains("init {") {
        return content.to_string();
    }
    let mut block = String::from("    init {\n");
    for f in &fields {
        block.push_str(&format!(
            "        require({0}.isNotBlank()) {{ \"{0} must not be blank\" }}\n",
            f
        ));
    }
    block.push_str("    }\n");

    let trimmed = content.trim_end();
    if trimmed.ends_with(')') {
        format!("{} {{\n{}}}\n", trimmed, block)
    } else {
        insert_before_closing_brace(content, &format!("\n{}", block))
    }
}

fn insert_before_closing_brace(content: &str, block: &str) -> String {
    match content.rfind('}') {
        Some(idx) => format!("{}\n{}}}\n", content[..idx].trim_end(), block),
        None => format!("{}\n{}", content, block),
    }
}

fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kotlin_ctx() -> ProjectContext {
        ProjectContext::new(".")
    }

    fn content_of(task: &Task) -> &str {
        task.tool_calls[0].param_str("file_content").unwrap()
    }

    #[test]
    fn blank_requirement_yields_no_tasks() {
        let d = TaskDecomposer::new();
        assert!(d.decompose("", &kotlin_ctx()).is_empty());
        assert!(d.decompose("   \n", &kotlin_ctx()).is_empty());
    }

    #[test]
    fn every_rule_yields_tasks_with_calls() {
        let d = TaskDecomposer::new();
        for req in [
            "Create a User class",
            "Build a REST API for products",
            "Configure the server port 9090",
            "Tidy up the readme wording",
        ] {
            let tasks = d.decompose(req, &kotlin_ctx());
            assert!(!tasks.is_empty(), "{}", req);
            assert!(tasks.iter().all(|t| !t.tool_calls.is_empty()), "{}", req);
            assert!(d.validate_task_sequence(&tasks).is_valid(), "{}", req);
        }
    }

    #[test]
    fn data_class_with_properties() {
        let tasks = TaskDecomposer::new().decompose(
            "Create a simple User data class with name and email properties",
            &kotlin_ctx(),
        );
        assert_eq!(tasks.len(), 1);
        let call = &tasks[0].tool_calls[0];
        assert_eq!(call.tool_name(), "save-file");
        assert_eq!(call.param_str("path"), Some("User.kt"));
        assert_eq!(
            content_of(&tasks[0]),
            "data class User(\n    val name: String,\n    val email: String,\n)\n"
        );
    }

    #[test]
    fn java_gradle_project_uses_layout_and_bean() {
        let ctx = ProjectContext::new(".")
            .with_language("java")
            .with_build_tool("gradle");
        let tasks = TaskDecomposer::new().decompose(
            "Create an Order class with customer id, total price and quantity fields",
            &ctx,
        );
        let call = &tasks[0].tool_calls[0];
        assert_eq!(call.param_str("path"), Some("src/main/java/Order.java"));
        let content = content_of(&tasks[0]);
        assert!(content.contains("private Long customerId;"));
        assert!(content.contains("private Double totalPrice;"));
        assert!(content.contains("private Integer quantity;"));
        assert!(content.contains("public void setQuantity(Integer quantity)"));
    }

    #[test]
    fn rest_resource_chain_with_optional_tasks() {
        let tasks = TaskDecomposer::new().decompose(
            "Build a REST API for products with validation and unit tests",
            &kotlin_ctx(),
        );
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "product-model",
                "product-service",
                "product-controller",
                "product-validation",
                "product-tests"
            ]
        );
        let priorities: Vec<u32> = tasks.iter().map(|t| t.priority).collect();
        assert_eq!(priorities, vec![1, 2, 3, 4, 5]);
        assert_eq!(tasks[1].dependencies, vec!["product-model"]);
        assert_eq!(tasks[2].dependencies, vec!["product-service"]);
        assert!(content_of(&tasks[2]).contains("@RequestMapping(\"/api/products\")"));
        assert_eq!(
            tasks[4].tool_calls[0].param_str("path"),
            Some("test/service/ProductServiceTest.kt")
        );
    }

    #[test]
    fn rest_without_extras_has_three_tasks() {
        let tasks = TaskDecomposer::new().decompose("CRUD endpoints for Invoice", &kotlin_ctx());
        assert_eq!(tasks.len(), 3);
        assert_eq!(
            tasks[0].tool_calls[0].param_str("path"),
            Some("model/Invoice.kt")
        );
    }

    #[test]
    fn configuration_picks_up_port() {
        let ctx = ProjectContext::new(".").with_build_tool("maven");
        let tasks = TaskDecomposer::new().decompose("Configure the server port 9090", &ctx);
        let call = &tasks[0].tool_calls[0];
        assert_eq!(
            call.param_str("path"),
            Some("src/main/resources/application.yml")
        );
        assert!(content_of(&tasks[0]).contains("port: 9090"));
    }

    #[test]
    fn fallback_inspects_then_writes_plan() {
        let tasks = TaskDecomposer::new().decompose("Tidy up the readme wording", &kotlin_ctx());
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].tool_calls[0].tool_name(), "view");
        assert_eq!(tasks[1].dependencies, vec!["analyze-project"]);
        assert!(content_of(&tasks[1]).contains("Tidy up the readme wording"));
    }

    #[test]
    fn refine_adds_kotlin_validation_and_immutability() {
        let d = TaskDecomposer::new();
        let tasks = d.decompose("Create a Person class with name and age properties", &kotlin_ctx());
        assert!(content_of(&tasks[0]).contains("var name: String"));

        let refined = d.refine_task(&tasks[0], "make it immutable and add validation");
        let content = content_of(&refined);
        assert!(content.contains("val name: String"));
        assert!(!content.contains("var "));
        assert!(content.contains("require(name.isNotBlank())"));
        assert!(!content.contains("require(age"));
        assert!(refined.description.ends_with("(feedback: make it immutable and add validation)"));

        // Original task untouched
        assert!(content_of(&tasks[0]).contains("var name: String"));
    }

    #[test]
    fn refine_java_immutable_drops_setters() {
        let ctx = ProjectContext::new(".").with_language("java");
        let d = TaskDecomposer::new();
        let tasks = d.decompose("Create a Book class with title field", &ctx);
        let refined = d.refine_task(&tasks[0], "immutable please");
        let content = content_of(&refined);
        assert!(content.contains("private final String title;"));
        assert!(!content.contains("setTitle"));
        assert!(!content.contains("public Book() {"));
    }

    #[test]
    fn unknown_feedback_only_annotates() {
        let d = TaskDecomposer::new();
        let tasks = d.decompose("Create a User class", &kotlin_ctx());
        let refined = d.refine_task(&tasks[0], "use tabs");
        assert_eq!(refined.tool_calls, tasks[0].tool_calls);
        assert_ne!(refined.description, tasks[0].description);
        assert_eq!(d.refine_task(&tasks[0], "  "), tasks[0]);
    }

    #[test]
    fn entity_fallbacks() {
        let tokens = words("build a rest api for orders");
        assert_eq!(extract_entity("build a rest api for orders", &tokens), "Order");
        let tokens = words("do something");
        assert_eq!(extract_entity("do something", &tokens), "Item");
    }

    #[test]
    fn fallback_entity_cannot_carry_path_characters() {
        let requirement = "create a rest api for a/../b";
        let tokens = words(requirement);
        let entity = extract_entity(requirement, &tokens);
        assert!(entity.chars().all(|c| c.is_ascii_alphanumeric()), "{}", entity);

        let tasks = TaskDecomposer::new().decompose(requirement, &kotlin_ctx());
        for call in tasks.iter().flat_map(|t| &t.tool_calls) {
            if let Some(path) = call.param_str("path") {
                assert!(!path.contains(".."), "{}", path);
            }
        }
    }
}
