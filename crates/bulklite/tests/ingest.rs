//! End-to-end scenarios: build a database, reopen it with SQLite itself.

use std::fs::File;
use std::path::{Path, PathBuf};

use bulklite::{Database, Record, PAGE_SIZE, ROWS_PER_LEAF};
use tempfile::TempDir;

/// Build a database file with `fill`, close it, and reopen it with SQLite.
fn build<F>(fill: F) -> (TempDir, PathBuf, rusqlite::Connection)
where
    F: FnOnce(&Database<&File>) -> bulklite::Result<()>,
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bulk.db");
    let file = File::create(&path).unwrap();

    let db = Database::new(&file);
    fill(&db).unwrap();
    db.close().unwrap();

    let conn = rusqlite::Connection::open(&path).unwrap();
    (dir, path, conn)
}

fn file_pages(path: &Path) -> u64 {
    let len = std::fs::metadata(path).unwrap().len();
    assert_eq!(len % PAGE_SIZE as u64, 0, "file is not page aligned");
    len / PAGE_SIZE as u64
}

fn encode_one(build: impl FnOnce(&mut Record)) -> Vec<u8> {
    let mut rec = Record::new();
    build(&mut rec);
    rec.to_vec()
}

#[test]
fn empty_database() {
    let (_dir, path, conn) = build(|_| Ok(()));

    assert_eq!(file_pages(&path), 1);
    let n: i64 = conn
        .query_row("SELECT count(*) FROM sqlite_master", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 0);
}

#[test]
fn single_table_single_row() {
    let (_dir, path, conn) = build(|db| {
        let table = db.open_table();
        let mut stream = table.open_stream();
        stream.write_row(&encode_one(|r| r.append_int(42)))?;
        stream.close()?;
        table.close("t", "CREATE TABLE t(x)")
    });

    // Page 1 is the header, page 2 the table's only leaf, which is the root.
    assert_eq!(file_pages(&path), 2);

    let (root, sql): (i64, String) = conn
        .query_row(
            "SELECT rootpage, sql FROM sqlite_master WHERE name = 't'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(root, 2);
    assert_eq!(sql, "CREATE TABLE t(x)");

    let (rowid, x): (i64, i64) = conn
        .query_row("SELECT rowid, x FROM t", [], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap();
    assert_eq!(rowid, 2 * ROWS_PER_LEAF);
    assert_eq!(x, 42);
}

#[test]
fn leaf_overflow_by_row_count() {
    const ROWS: i64 = 30_000;

    let (_dir, _path, conn) = build(|db| {
        let table = db.open_table();
        let mut stream = table.open_stream();
        let mut rec = Record::new();
        let mut row = Vec::new();
        for i in 0..ROWS {
            rec.reset();
            rec.append_int(i);
            rec.append_text(&format!("row-{i}"));
            row.clear();
            rec.encode_to(&mut row);
            stream.write_row(&row)?;
        }
        stream.close()?;
        table.close("t", "CREATE TABLE t(n, label)")
    });

    let n: i64 = conn
        .query_row("SELECT count(*) FROM t", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, ROWS);

    // The table outgrew one leaf, so its root is an interior page above
    // leaves at pages 2, 3, 4, ...
    let root: i64 = conn
        .query_row("SELECT rootpage FROM sqlite_master WHERE name = 't'", [], |r| {
            r.get(0)
        })
        .unwrap();
    assert!(root > 2, "expected an interior root, got page {root}");

    // Rows come back in insertion order with strictly increasing rowids,
    // dense within each leaf's block.
    let mut stmt = conn.prepare("SELECT rowid, n FROM t ORDER BY rowid").unwrap();
    let mut rows = stmt.query([]).unwrap();
    let mut expected_n = 0i64;
    let mut previous_rowid = 0i64;
    while let Some(row) = rows.next().unwrap() {
        let rowid: i64 = row.get(0).unwrap();
        let n: i64 = row.get(1).unwrap();
        assert_eq!(n, expected_n);
        assert!(rowid > previous_rowid);
        if previous_rowid != 0 && rowid % ROWS_PER_LEAF != 0 {
            assert_eq!(
                rowid,
                previous_rowid + 1,
                "rowids must be dense inside a block"
            );
        }
        if expected_n == 0 {
            assert_eq!(rowid, 2 * ROWS_PER_LEAF);
        }
        previous_rowid = rowid;
        expected_n += 1;
    }
    assert_eq!(expected_n, ROWS);
}

#[test]
fn payload_overflow_chain() {
    let blob: Vec<u8> = (0..10 * PAGE_SIZE).map(|i| (i * 31 % 251) as u8).collect();

    let blob_for_fill = blob.clone();
    let (_dir, path, conn) = build(move |db| {
        let table = db.open_table();
        let mut stream = table.open_stream();
        stream.write_row(&encode_one(|r| r.append_blob(&blob_for_fill)))?;
        stream.close()?;
        table.close("t", "CREATE TABLE t(data)")
    });

    let data: Vec<u8> = conn
        .query_row("SELECT data FROM t", [], |r| r.get(0))
        .unwrap();
    assert_eq!(data, blob);

    // Header page, one leaf, and a 10-page overflow chain: the record
    // payload (serial-type header plus blob) keeps M = 8199 bytes local
    // and spills the rest at page_size - 4 bytes per page.
    let record_len = encode_one(|r| r.append_blob(&blob)).len() as u64;
    let local = 8199u64;
    let chain = (record_len - local).div_ceil(PAGE_SIZE as u64 - 4);
    assert_eq!(file_pages(&path), 2 + chain);
}

#[test]
fn schema_row_overflows_into_chain() {
    let filler = "f".repeat(120_000);
    let sql = format!("CREATE TABLE t(x DEFAULT '{filler}')");

    let sql_for_fill = sql.clone();
    let (_dir, _path, conn) = build(move |db| {
        let table = db.open_table();
        table.close("t", &sql_for_fill)
    });

    let stored: String = conn
        .query_row("SELECT sql FROM sqlite_master WHERE name = 't'", [], |r| {
            r.get(0)
        })
        .unwrap();
    assert_eq!(stored, sql);

    let n: i64 = conn
        .query_row("SELECT count(*) FROM t", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 0);
}

#[test]
fn schema_spills_off_the_header_page() {
    // Enough CREATE TABLE text that the schema rows cannot all live on
    // page 1: the header page becomes an interior node over schema leaves.
    const TABLES: usize = 24;
    let mut sqls = Vec::new();
    for t in 0..TABLES {
        let filler = format!("c{t}_").repeat(1500);
        sqls.push(format!("CREATE TABLE t{t}(x DEFAULT '{filler}')"));
    }

    let sqls_for_fill = sqls.clone();
    let (_dir, _path, conn) = build(move |db| {
        for (t, sql) in sqls_for_fill.iter().enumerate() {
            let table = db.open_table();
            table.close(&format!("t{t}"), sql)?;
        }
        Ok(())
    });

    let n: i64 = conn
        .query_row("SELECT count(*) FROM sqlite_master", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, TABLES as i64);

    for (t, sql) in sqls.iter().enumerate() {
        let stored: String = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE name = ?1",
                [format!("t{t}")],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(&stored, sql);
        let count: i64 = conn
            .query_row(&format!("SELECT count(*) FROM t{t}"), [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}

#[test]
fn schema_spill_keeps_table_data_reachable() {
    // Mix a populated table into a spilling schema to make sure the
    // rewritten schema B-tree still points at the right roots.
    const TABLES: usize = 20;

    let (_dir, _path, conn) = build(|db| {
        let data = db.open_table();
        let mut stream = data.open_stream();
        for i in 0..500i64 {
            stream.write_row(&encode_one(|r| r.append_int(i * i)))?;
        }
        stream.close()?;
        data.close("data", "CREATE TABLE data(sq)")?;

        for t in 0..TABLES {
            let filler = "pad".repeat(2000);
            let table = db.open_table();
            table.close(&format!("t{t}"), &format!("CREATE TABLE t{t}(x DEFAULT '{filler}')"))?;
        }
        Ok(())
    });

    let n: i64 = conn
        .query_row("SELECT count(*) FROM data", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 500);
    let last: i64 = conn
        .query_row("SELECT sq FROM data ORDER BY rowid DESC LIMIT 1", [], |r| {
            r.get(0)
        })
        .unwrap();
    assert_eq!(last, 499 * 499);
}

#[test]
fn typed_values_survive_a_round_trip() {
    let (_dir, _path, conn) = build(|db| {
        let table = db.open_table();
        let mut stream = table.open_stream();
        let mut rec = Record::new();
        rec.append_null();
        rec.append_bool(true);
        rec.append_int(-77);
        rec.append_uint(1 << 40);
        rec.append_float(2.5);
        rec.append_float(12.0);
        rec.append_text("héllo");
        rec.append_blob(&[0, 1, 2, 254, 255]);
        rec.append_json(&serde_json_like()).unwrap();
        stream.write_row(&rec.to_vec())?;
        stream.close()?;
        table.close("v", "CREATE TABLE v(a, b, c, d, e, f, g, h, j)")
    });

    conn.query_row(
        "SELECT a, b, c, d, e, f, g, h, j, typeof(f) FROM v",
        [],
        |r| {
            assert_eq!(r.get::<_, Option<i64>>(0)?, None);
            assert_eq!(r.get::<_, i64>(1)?, 1);
            assert_eq!(r.get::<_, i64>(2)?, -77);
            assert_eq!(r.get::<_, i64>(3)?, 1 << 40);
            assert_eq!(r.get::<_, f64>(4)?, 2.5);
            // Exactly integral floats are stored as integers.
            assert_eq!(r.get::<_, i64>(5)?, 12);
            assert_eq!(r.get::<_, String>(6)?, "héllo");
            assert_eq!(r.get::<_, Vec<u8>>(7)?, vec![0, 1, 2, 254, 255]);
            assert_eq!(r.get::<_, String>(8)?, r#"{"k":[1,2]}"#);
            assert_eq!(r.get::<_, String>(9)?, "integer");
            Ok(())
        },
    )
    .unwrap();
}

fn serde_json_like() -> std::collections::BTreeMap<String, Vec<i32>> {
    let mut m = std::collections::BTreeMap::new();
    m.insert("k".to_owned(), vec![1, 2]);
    m
}

#[test]
fn multiple_tables_each_get_their_own_tree() {
    let (_dir, _path, conn) = build(|db| {
        let a = db.open_table();
        let b = db.open_table();

        let mut sa = a.open_stream();
        let mut sb = b.open_stream();
        for i in 0..100i64 {
            sa.write_row(&encode_one(|r| r.append_int(i)))?;
            sb.write_row(&encode_one(|r| r.append_int(1000 + i)))?;
        }
        sa.close()?;
        sb.close()?;
        a.close("a", "CREATE TABLE a(x)")?;
        b.close("b", "CREATE TABLE b(x)")
    });

    let sum_a: i64 = conn
        .query_row("SELECT sum(x) FROM a", [], |r| r.get(0))
        .unwrap();
    let sum_b: i64 = conn
        .query_row("SELECT sum(x) FROM b", [], |r| r.get(0))
        .unwrap();
    assert_eq!(sum_a, 4950);
    assert_eq!(sum_b, 100 * 1000 + 4950);
}

#[test]
fn flush_midway_leaves_a_rowid_gap() {
    let (_dir, _path, conn) = build(|db| {
        let table = db.open_table();
        let mut stream = table.open_stream();
        stream.write_row(&encode_one(|r| r.append_int(1)))?;
        stream.flush()?;
        stream.write_row(&encode_one(|r| r.append_int(2)))?;
        stream.close()?;
        table.close("t", "CREATE TABLE t(x)")
    });

    let rowids: Vec<i64> = conn
        .prepare("SELECT rowid FROM t ORDER BY rowid")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    // Two leaves at pages 2 and 3: their blocks start a full block apart.
    assert_eq!(rowids, vec![2 * ROWS_PER_LEAF, 3 * ROWS_PER_LEAF]);
}
