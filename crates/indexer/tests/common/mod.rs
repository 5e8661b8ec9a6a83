// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use predictboard_indexer::SqlStore;
use tempfile::NamedTempFile;

// Store both the database and temp file to keep the file alive
pub struct TestDb {
    pub store: SqlStore,
    pub url: String,
    _temp_file: NamedTempFile,
}

pub async fn setup_test_db() -> TestDb {
    let temp_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = temp_file.path().to_str().expect("Invalid temp path");
    let url = format!("sqlite:{}", db_path);

    let store = SqlStore::new(&url).await.expect("Failed to create database");
    TestDb { store, url, _temp_file: temp_file }
}
