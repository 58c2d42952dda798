#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_meritd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn meritd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawn and select a fresh temp workspace.
    pub fn with_workspace(prefix: &str) -> (Self, PathBuf) {
        let workspace = temp_dir(prefix);
        let mut sc = Self::spawn();
        sc.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        (sc, workspace)
    }

    pub fn send_line(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        let value = self.send_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Error code of a request expected to fail.
    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }

    pub fn create_class(&mut self, name: &str, division: &str) -> String {
        let r = self.ok("classes.create", json!({ "name": name, "division": division }));
        str_field(&r, "classId")
    }

    pub fn create_student(&mut self, class_id: &str, name: &str, active: bool) -> String {
        let r = self.ok(
            "students.create",
            json!({
                "classId": class_id,
                "name": name,
                "status": if active { "active" } else { "inactive" }
            }),
        );
        str_field(&r, "studentId")
    }

    pub fn create_subject(&mut self, class_id: &str, name: &str, max: f64, pass: f64) -> String {
        let r = self.ok(
            "subjects.create",
            json!({
                "classId": class_id,
                "name": name,
                "maxMarks": max,
                "passMarks": pass
            }),
        );
        str_field(&r, "subjectId")
    }

    pub fn create_exam(&mut self, name: &str, status: &str) -> String {
        let r = self.ok("exams.create", json!({ "name": name, "status": status }));
        str_field(&r, "examId")
    }

    pub fn upsert_marks(&mut self, exam_id: &str, subject_id: &str, marks: &[(&str, f64)]) {
        let records: Vec<serde_json::Value> = marks
            .iter()
            .map(|(s, m)| json!({ "studentId": s, "marks": m }))
            .collect();
        self.ok(
            "results.upsert",
            json!({ "examId": exam_id, "subjectId": subject_id, "records": records }),
        );
    }

    pub fn shutdown(mut self) {
        drop(self.stdin);
        let _ = self.child.wait();
    }
}

pub fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
        .to_string()
}
