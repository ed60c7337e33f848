//! Host bindings exposed to generated scripts: dataset access, element-wise
//! array arithmetic, aggregation helpers, and the chart API.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, Position};

use crate::chart::{ChartSpec, ChartStyle};
use crate::data::{Column, FrameHandle};

pub fn register(engine: &mut Engine) {
    register_dataset(engine);
    register_arith(engine);
    register_helpers(engine);
    register_chart(engine);
}

fn runtime_err(msg: impl Into<String>) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(Dynamic::from(msg.into()), Position::NONE).into()
}

fn register_dataset(engine: &mut Engine) {
    engine
        .register_type_with_name::<FrameHandle>("Dataset")
        .register_fn("nrows", |ds: &mut FrameHandle| ds.lock().height() as i64)
        .register_fn("ncols", |ds: &mut FrameHandle| ds.lock().width() as i64)
        .register_fn("columns", |ds: &mut FrameHandle| -> Array {
            ds.lock().names().into_iter().map(Dynamic::from).collect()
        })
        .register_indexer_get(
            |ds: &mut FrameHandle, name: &str| -> Result<Array, Box<EvalAltResult>> {
                let frame = ds.lock();
                let column = frame
                    .column(name)
                    .ok_or_else(|| runtime_err(format!("unknown column: {name}")))?;
                Ok(column_to_array(column))
            },
        )
        .register_indexer_set(
            |ds: &mut FrameHandle, name: &str, values: Array| -> Result<(), Box<EvalAltResult>> {
                let column = array_to_column(&values);
                ds.lock()
                    .set_column(name, column)
                    .map_err(|e| runtime_err(e.to_string()))
            },
        );
}

fn column_to_array(column: &Column) -> Array {
    match column {
        Column::Int64(v) => v
            .iter()
            .map(|x| x.map(Dynamic::from).unwrap_or(Dynamic::UNIT))
            .collect(),
        Column::Float64(v) => v
            .iter()
            .map(|x| x.map(Dynamic::from_float).unwrap_or(Dynamic::UNIT))
            .collect(),
        Column::Bool(v) => v
            .iter()
            .map(|x| x.map(Dynamic::from_bool).unwrap_or(Dynamic::UNIT))
            .collect(),
        Column::Text(v) => v
            .iter()
            .map(|x| x.clone().map(Dynamic::from).unwrap_or(Dynamic::UNIT))
            .collect(),
        Column::DateTime(v) => v
            .iter()
            .map(|x| {
                x.map(|d| Dynamic::from(d.format("%Y-%m-%d %H:%M:%S").to_string()))
                    .unwrap_or(Dynamic::UNIT)
            })
            .collect(),
    }
}

/// Narrowest typed column that fits the array: all-int, int/float mix,
/// all-bool, otherwise text. Unit elements become nulls.
fn array_to_column(values: &Array) -> Column {
    let defined = values.iter().filter(|v| !v.is_unit());
    let mut all_int = true;
    let mut all_num = true;
    let mut all_bool = true;
    let mut any = false;
    for v in defined {
        any = true;
        all_int &= v.is::<i64>();
        all_num &= v.is::<i64>() || v.is::<f64>();
        all_bool &= v.is::<bool>();
    }
    if !any {
        return Column::Text(values.iter().map(|_| None).collect());
    }
    if all_int {
        Column::Int64(
            values
                .iter()
                .map(|v| v.clone().try_cast::<i64>())
                .collect(),
        )
    } else if all_num {
        Column::Float64(values.iter().map(to_num).collect())
    } else if all_bool {
        Column::Bool(
            values
                .iter()
                .map(|v| v.clone().try_cast::<bool>())
                .collect(),
        )
    } else {
        Column::Text(
            values
                .iter()
                .map(|v| (!v.is_unit()).then(|| v.to_string()))
                .collect(),
        )
    }
}

fn to_num(v: &Dynamic) -> Option<f64> {
    if let Some(i) = v.clone().try_cast::<i64>() {
        Some(i as f64)
    } else {
        v.clone().try_cast::<f64>()
    }
}

fn zip_arith(a: &Array, b: &Array, f: fn(f64, f64) -> f64) -> Result<Array, Box<EvalAltResult>> {
    if a.len() != b.len() {
        return Err(runtime_err(format!(
            "array length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| match (to_num(x), to_num(y)) {
            (Some(x), Some(y)) => Dynamic::from_float(f(x, y)),
            _ => Dynamic::UNIT,
        })
        .collect())
}

fn scalar_arith(a: &Array, scalar: f64, f: fn(f64, f64) -> f64, scalar_first: bool) -> Array {
    a.iter()
        .map(|v| match to_num(v) {
            Some(x) if scalar_first => Dynamic::from_float(f(scalar, x)),
            Some(x) => Dynamic::from_float(f(x, scalar)),
            None => Dynamic::UNIT,
        })
        .collect()
}

/// Element-wise `+ - * /` between arrays and numbers. Nulls propagate.
fn register_arith(engine: &mut Engine) {
    macro_rules! bin_op {
        ($sym:literal, $f:expr) => {{
            let f: fn(f64, f64) -> f64 = $f;
            engine.register_fn(
                $sym,
                move |a: Array, b: Array| -> Result<Array, Box<EvalAltResult>> {
                    zip_arith(&a, &b, f)
                },
            );
            engine.register_fn($sym, move |a: Array, b: i64| {
                scalar_arith(&a, b as f64, f, false)
            });
            engine.register_fn($sym, move |a: Array, b: f64| scalar_arith(&a, b, f, false));
            engine.register_fn($sym, move |a: i64, b: Array| {
                scalar_arith(&b, a as f64, f, true)
            });
            engine.register_fn($sym, move |a: f64, b: Array| scalar_arith(&b, a, f, true));
        }};
    }
    bin_op!("+", |x, y| x + y);
    bin_op!("-", |x, y| x - y);
    bin_op!("*", |x, y| x * y);
    bin_op!("/", |x, y| x / y);
}

fn register_helpers(engine: &mut Engine) {
    engine.register_fn("sum", |a: Array| -> f64 {
        a.iter().filter_map(to_num).sum()
    });
    engine.register_fn("mean", |a: Array| -> f64 {
        let nums: Vec<f64> = a.iter().filter_map(to_num).collect();
        if nums.is_empty() {
            0.0
        } else {
            nums.iter().sum::<f64>() / nums.len() as f64
        }
    });
    engine.register_fn("unique", |a: Array| -> Array {
        let mut seen = Vec::new();
        let mut out = Array::new();
        for v in &a {
            let key = v.to_string();
            if !seen.contains(&key) {
                seen.push(key);
                out.push(v.clone());
            }
        }
        out
    });
    engine.register_fn(
        "group_sum",
        |keys: Array, values: Array| -> Result<Map, Box<EvalAltResult>> {
            if keys.len() != values.len() {
                return Err(runtime_err(format!(
                    "group_sum length mismatch: {} keys vs {} values",
                    keys.len(),
                    values.len()
                )));
            }
            let mut out = Map::new();
            for (k, v) in keys.iter().zip(&values) {
                let Some(v) = to_num(v) else { continue };
                let key = k.to_string();
                let entry = out
                    .entry(key.into())
                    .or_insert_with(|| Dynamic::from_float(0.0));
                let current = entry.clone().try_cast::<f64>().unwrap_or(0.0);
                *entry = Dynamic::from_float(current + v);
            }
            Ok(out)
        },
    );
}

/// Chart handle shared between the script and the renderer.
#[derive(Debug, Clone)]
pub struct ChartHandle(Arc<Mutex<ChartSpec>>);

impl ChartHandle {
    fn new(title: &str) -> Self {
        Self(Arc::new(Mutex::new(ChartSpec::new(title))))
    }

    fn lock(&self) -> MutexGuard<'_, ChartSpec> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn register_chart(engine: &mut Engine) {
    engine
        .register_type_with_name::<ChartHandle>("Chart")
        .register_fn("chart", |title: &str| ChartHandle::new(title))
        .register_fn("x_label", |c: &mut ChartHandle, label: &str| {
            c.lock().x_label = label.to_string();
        })
        .register_fn("y_label", |c: &mut ChartHandle, label: &str| {
            c.lock().y_label = label.to_string();
        })
        .register_fn(
            "size",
            |c: &mut ChartHandle, w: i64, h: i64| -> Result<(), Box<EvalAltResult>> {
                if w <= 0 || h <= 0 {
                    return Err(runtime_err("chart size must be positive"));
                }
                let mut spec = c.lock();
                spec.width = w as u32;
                spec.height = h as u32;
                Ok(())
            },
        )
        .register_fn(
            "style",
            |c: &mut ChartHandle, name: &str| -> Result<(), Box<EvalAltResult>> {
                let style = ChartStyle::parse(name).map_err(|e| runtime_err(e.to_string()))?;
                c.lock().style = style;
                Ok(())
            },
        )
        .register_fn(
            "bar",
            |c: &mut ChartHandle,
             name: &str,
             labels: Array,
             values: Array|
             -> Result<(), Box<EvalAltResult>> {
                let labels = labels.iter().map(|v| v.to_string()).collect();
                let values = numeric_vec(&values);
                c.lock()
                    .add_bar(name, labels, values)
                    .map_err(|e| runtime_err(e.to_string()))
            },
        )
        .register_fn(
            "line",
            |c: &mut ChartHandle,
             name: &str,
             xs: Array,
             ys: Array|
             -> Result<(), Box<EvalAltResult>> {
                c.lock()
                    .add_line(name, numeric_vec(&xs), numeric_vec(&ys))
                    .map_err(|e| runtime_err(e.to_string()))
            },
        )
        .register_fn(
            "scatter",
            |c: &mut ChartHandle,
             name: &str,
             xs: Array,
             ys: Array|
             -> Result<(), Box<EvalAltResult>> {
                c.lock()
                    .add_scatter(name, numeric_vec(&xs), numeric_vec(&ys))
                    .map_err(|e| runtime_err(e.to_string()))
            },
        )
        .register_fn(
            "save",
            |c: &mut ChartHandle, path: &str| -> Result<(), Box<EvalAltResult>> {
                c.lock()
                    .save(Path::new(path))
                    .map_err(|e| runtime_err(format!("failed to save chart: {e}")))
            },
        );
}

/// Nulls and non-numerics map to NaN; the renderer skips non-finite points.
fn numeric_vec(values: &Array) -> Vec<f64> {
    values
        .iter()
        .map(|v| to_num(v).unwrap_or(f64::NAN))
        .collect()
}
