//! Source templates for the built-in compiled runtimes.
//!
//! Each wrapper reads the event JSON from stdin, calls the user's
//! `handler`, and writes the JSON-encoded return value to stdout. Anything
//! else the user prints should end up on stderr, which becomes the logs.

pub(crate) const SH_MAIN: &str = r#"#!/bin/sh
__USER_CODE__

if ! command -v handler >/dev/null 2>&1; then
    echo "no handler function defined." >&2
    exit 1
fi

handler "$(cat)"
"#;

pub(crate) const PYTHON_MAIN: &str = r#"import json
import sys

_result_stream = sys.stdout
sys.stdout = sys.stderr

__USER_CODE__


def _lambdabox_main():
    fn = globals().get("handler")
    if not callable(fn):
        sys.stderr.write("no handler function defined.\n")
        sys.exit(1)
    raw = sys.stdin.read()
    event = json.loads(raw) if raw.strip() else {}
    result = fn(event)
    _result_stream.write(json.dumps(result, default=str))
    _result_stream.flush()


if __name__ == "__main__":
    _lambdabox_main()
"#;

pub(crate) const JAVASCRIPT_MAIN: &str = r#"'use strict';
const __resultStream = process.stdout;
const __logTo = (prefix) => (...args) => {
  const line = args.map((a) => (typeof a === 'string' ? a : JSON.stringify(a))).join(' ');
  process.stderr.write(prefix + line + '\n');
};
console.log = __logTo('');
console.info = __logTo('');
console.debug = __logTo('');
console.warn = __logTo('[WARN] ');
console.error = __logTo('[ERROR] ');

__USER_CODE__

(async () => {
  if (typeof handler !== 'function') {
    process.stderr.write('no handler function defined.\n');
    process.exit(1);
  }
  const raw = require('fs').readFileSync(0, 'utf8');
  const event = raw.trim() ? JSON.parse(raw) : {};
  const result = await handler(event);
  __resultStream.write(result === undefined ? 'null' : JSON.stringify(result));
})().catch((err) => {
  process.stderr.write(String((err && err.stack) || err) + '\n');
  process.exit(1);
});
"#;

pub(crate) const RUBY_MAIN: &str = r#"require 'json'

$lambdabox_result = $stdout
$stdout = $stderr

__USER_CODE__

unless respond_to?(:handler, true)
  warn 'no handler function defined.'
  exit 1
end

raw = STDIN.read
event = raw.strip.empty? ? {} : JSON.parse(raw)
$lambdabox_result.write(JSON.generate(handler(event)))
"#;

pub(crate) const GO_MAIN: &str = r#"package main

import (
	"encoding/json"
	"fmt"
	"os"
)

__USER_CODE__

func main() {
	resultOut := os.Stdout
	os.Stdout = os.Stderr

	var event map[string]interface{}
	if err := json.NewDecoder(os.Stdin).Decode(&event); err != nil {
		fmt.Fprintf(os.Stderr, "Error reading input: %v\n", err)
		os.Exit(1)
	}

	output, err := json.Marshal(handler(event))
	if err != nil {
		fmt.Fprintf(os.Stderr, "Error encoding output: %v\n", err)
		os.Exit(1)
	}
	resultOut.Write(output)
}
"#;

pub(crate) const RUST_CARGO_TOML: &str = r#"[package]
name = "handler"
version = "0.1.0"
edition = "2021"

[dependencies]
serde_json = "1"

[workspace]
"#;

pub(crate) const RUST_MAIN: &str = r#"use serde_json::{json, Value};
use std::io::{self, Read};

__USER_CODE__

fn main() {
    let mut raw = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut raw) {
        eprintln!("Error reading input: {e}");
        std::process::exit(1);
    }
    let event: Value = if raw.trim().is_empty() {
        json!({})
    } else {
        match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Error parsing input: {e}");
                std::process::exit(1);
            }
        }
    };
    print!("{}", handler(event));
}
"#;

pub(crate) const C99_MAIN: &str = r#"#include <stdio.h>
#include <stdlib.h>
#include <string.h>
#include <cjson/cJSON.h>

__USER_CODE__

static char *read_stdin(void) {
    size_t cap = 4096, len = 0;
    char *buf = malloc(cap);
    if (!buf) return NULL;
    size_t n;
    while ((n = fread(buf + len, 1, cap - len - 1, stdin)) > 0) {
        len += n;
        if (cap - len <= 1) {
            cap *= 2;
            char *grown = realloc(buf, cap);
            if (!grown) { free(buf); return NULL; }
            buf = grown;
        }
    }
    buf[len] = '\0';
    return buf;
}

int main(void) {
    char *raw = read_stdin();
    if (!raw) {
        fprintf(stderr, "Error reading input\n");
        return 1;
    }
    cJSON *event = strlen(raw) ? cJSON_Parse(raw) : cJSON_CreateObject();
    free(raw);
    if (!event) {
        fprintf(stderr, "Error parsing input\n");
        return 1;
    }

    cJSON *result = handler(event);
    char *out = cJSON_PrintUnformatted(result);
    if (out) {
        fputs(out, stdout);
        free(out);
    }
    cJSON_Delete(event);
    if (result != event) cJSON_Delete(result);
    return 0;
}
"#;

pub(crate) const CPP17_MAIN: &str = r#"#include <iostream>
#include <iterator>
#include <string>
#include <nlohmann/json.hpp>

using json = nlohmann::json;

__USER_CODE__

int main() {
    std::string raw((std::istreambuf_iterator<char>(std::cin)), std::istreambuf_iterator<char>());
    json event = json::object();
    if (raw.find_first_not_of(" \t\r\n") != std::string::npos) {
        try {
            event = json::parse(raw);
        } catch (const std::exception &e) {
            std::cerr << "Error parsing input: " << e.what() << std::endl;
            return 1;
        }
    }
    try {
        std::cout << handler(event).dump();
    } catch (const std::exception &e) {
        std::cerr << e.what() << std::endl;
        return 1;
    }
    return 0;
}
"#;
