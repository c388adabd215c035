// Tests for the bundled base and math libraries
use crate::*;

fn run(source: &str) -> LuaState {
    let mut state = LuaState::new(SafeOption::default());
    state.open_libs().unwrap();
    let result = state.do_string(source);
    assert!(result.is_ok(), "script failed: {:?}", result.err());
    state
}

fn run_err(source: &str) -> String {
    let mut state = LuaState::new(SafeOption::default());
    state.open_libs().unwrap();
    state.do_string(source).unwrap_err().message().to_string()
}

#[test]
fn test_type() {
    let state = run(r#"
        types = type(nil) .. ',' .. type(true) .. ',' .. type(1) .. ',' .. type(1.5)
            .. ',' .. type('s') .. ',' .. type({}) .. ',' .. type(print) .. ',' .. type(type)
    "#);
    assert_eq!(
        state.global_value("types").as_str(),
        Some("nil,boolean,number,number,string,table,function,function")
    );
    assert_eq!(run_err("type()"), "[string]:1: bad argument #1 to 'type' (value expected)");
}

#[test]
fn test_tonumber() {
    let state = run(r#"
        a = tonumber('42')
        b = tonumber(' 3.5 ')
        c = tonumber('0x1F')
        d = tonumber('abc')
        e = tonumber('1010', 2)
        f = tonumber('zz', 36)
        g = tonumber('8', 8)
        h = tonumber(7)
        i = tonumber({})
        j = tonumber('1e2')
    "#);
    assert_eq!(state.global_value("a"), LuaValue::Integer(42));
    assert_eq!(state.global_value("b"), LuaValue::Float(3.5));
    assert_eq!(state.global_value("c"), LuaValue::Integer(31));
    assert!(state.global_value("d").is_nil());
    assert_eq!(state.global_value("e"), LuaValue::Integer(10));
    assert_eq!(state.global_value("f"), LuaValue::Integer(35 * 36 + 35));
    assert!(state.global_value("g").is_nil());
    assert_eq!(state.global_value("h"), LuaValue::Integer(7));
    assert!(state.global_value("i").is_nil());
    assert_eq!(state.global_value("j"), LuaValue::Float(100.0));

    assert!(run_err("tonumber('1', 99)").contains("base out of range"));
    assert!(run_err("tonumber(1, 10)").contains("string expected, got number"));
}

#[test]
fn test_tostring() {
    let state = run(r#"
        a = tostring(12)
        b = tostring(-0.5)
        c = tostring(nil)
        d = tostring(false)
        e = tostring(1e15)
        t = tostring({})
        f = tostring(print)
    "#);
    assert_eq!(state.global_value("a").as_str(), Some("12"));
    assert_eq!(state.global_value("b").as_str(), Some("-0.5"));
    assert_eq!(state.global_value("c").as_str(), Some("nil"));
    assert_eq!(state.global_value("d").as_str(), Some("false"));
    assert_eq!(state.global_value("e").as_str(), Some("1e+15"));
    assert!(state.global_value("t").as_str().is_some_and(|s| s.starts_with("table: 0x")));
    assert!(state.global_value("f").as_str().is_some_and(|s| s.starts_with("function: 0x")));

    let err = run_err("tostring(setmetatable({}, { __tostring = function() return 1 end }))");
    assert!(err.contains("'__tostring' must return a string"), "got: {}", err);
}

#[test]
fn test_select() {
    let state = run(r#"
        count = select('#', 'a', nil, 'c')
        local x, y = select(2, 'a', 'b', 'c')
        pair = x .. y
        neg = select(-2, 'a', 'b', 'c')
        past = select(5, 'a')
    "#);
    assert_eq!(state.global_value("count"), LuaValue::Integer(3));
    assert_eq!(state.global_value("pair").as_str(), Some("bc"));
    assert_eq!(state.global_value("neg").as_str(), Some("b"));
    assert!(state.global_value("past").is_nil());

    assert!(run_err("select(0, 'a')").contains("index out of range"));
    assert!(run_err("select(-3, 'a')").contains("index out of range"));
}

#[test]
fn test_unpack() {
    let state = run(r#"
        local a, b, c = unpack({ 1, 2, 3 })
        sum = a + b + c
        local p, q = unpack({ 'x', 'y', 'z' }, 2)
        tail = p .. q
        local r = unpack({ 1, 2 }, 5, 4)
        empty = r == nil
        count = select('#', unpack({}, 1, 3))
    "#);
    assert_eq!(state.global_value("sum"), LuaValue::Integer(6));
    assert_eq!(state.global_value("tail").as_str(), Some("yz"));
    assert_eq!(state.global_value("empty"), LuaValue::Boolean(true));
    assert_eq!(state.global_value("count"), LuaValue::Integer(3));
}

#[test]
fn test_raw_access() {
    let state = run(r#"
        local seen = 0
        local t = setmetatable({}, {
            __index = function() return 'meta' end,
            __newindex = function() seen = seen + 1 end,
            __len = function() return 99 end,
            __eq = function() return true end,
        })
        rawset(t, 'k', 'v')
        raw = rawget(t, 'k')
        missing = rawget(t, 'other')
        via_meta = t.other
        t.new_key = 1
        newindex_calls = seen
        rawset(t, 1, 'a')
        len = #t
        rawlength = rawlen(t)
        strlen = rawlen('four')
        local u = setmetatable({}, getmetatable(t))
        meta_eq = t == u
        raw_eq = rawequal(t, u)
        self_eq = rawequal(t, t)
    "#);
    assert_eq!(state.global_value("raw").as_str(), Some("v"));
    assert!(state.global_value("missing").is_nil());
    assert_eq!(state.global_value("via_meta").as_str(), Some("meta"));
    assert_eq!(state.global_value("newindex_calls"), LuaValue::Integer(1));
    assert_eq!(state.global_value("len"), LuaValue::Integer(99));
    assert_eq!(state.global_value("rawlength"), LuaValue::Integer(1));
    assert_eq!(state.global_value("strlen"), LuaValue::Integer(4));
    assert_eq!(state.global_value("meta_eq"), LuaValue::Boolean(true));
    assert_eq!(state.global_value("raw_eq"), LuaValue::Boolean(false));
    assert_eq!(state.global_value("self_eq"), LuaValue::Boolean(true));

    assert!(run_err("rawset({}, nil, 1)").contains("table index is nil"));
}

#[test]
fn test_protected_metatable() {
    let state = run(r#"
        local t = setmetatable({}, { __metatable = 'locked' })
        mt = getmetatable(t)
        ok, err = pcall(setmetatable, t, {})
        plain = getmetatable({}) == nil
        str = getmetatable('s') == nil
    "#);
    assert_eq!(state.global_value("mt").as_str(), Some("locked"));
    assert_eq!(state.global_value("ok"), LuaValue::Boolean(false));
    assert_eq!(
        state.global_value("err").as_str(),
        Some("cannot change a protected metatable")
    );
    assert_eq!(state.global_value("plain"), LuaValue::Boolean(true));
    assert_eq!(state.global_value("str"), LuaValue::Boolean(true));
}

#[test]
fn test_next_and_pairs_metamethod() {
    let state = run(r#"
        local t = { 5 }
        k, v = next(t)
        after = next(t, k)
        empty = next({})

        local proxy = setmetatable({}, {
            __pairs = function(self)
                return function(_, i)
                    if i < 3 then return i + 1, (i + 1) * 10 end
                end, self, 0
            end,
        })
        total = 0
        for _, v in pairs(proxy) do total = total + v end
    "#);
    assert_eq!(state.global_value("k"), LuaValue::Integer(1));
    assert_eq!(state.global_value("v"), LuaValue::Integer(5));
    assert!(state.global_value("after").is_nil());
    assert!(state.global_value("empty").is_nil());
    assert_eq!(state.global_value("total"), LuaValue::Integer(60));
}

#[test]
fn test_math_rounding_and_abs() {
    let state = run(r#"
        f1 = math.floor(3.7)
        f2 = math.floor(-3.2)
        c1 = math.ceil(3.2)
        i = math.floor(5)
        a1 = math.abs(-4)
        a2 = math.abs(-2.5)
        big = math.floor(1e100)
        s = math.sqrt(16)
    "#);
    assert_eq!(state.global_value("f1"), LuaValue::Integer(3));
    assert_eq!(state.global_value("f2"), LuaValue::Integer(-4));
    assert_eq!(state.global_value("c1"), LuaValue::Integer(4));
    assert_eq!(state.global_value("i"), LuaValue::Integer(5));
    assert_eq!(state.global_value("a1"), LuaValue::Integer(4));
    assert_eq!(state.global_value("a2"), LuaValue::Float(2.5));
    assert_eq!(state.global_value("big"), LuaValue::Float(1e100));
    assert_eq!(state.global_value("s"), LuaValue::Float(4.0));
}

#[test]
fn test_math_min_max_and_types() {
    let state = run(r#"
        mx = math.max(3, 9, 4)
        mn = math.min(3, -1.5, 4)
        t1 = math.type(1)
        t2 = math.type(1.0)
        t3 = math.type('1')
        ti = math.tointeger(3.0)
        tf = math.tointeger(3.5)
        pi_ok = math.pi > 3.14 and math.pi < 3.15
        huge = math.huge > math.maxinteger
        minint = math.mininteger
    "#);
    assert_eq!(state.global_value("mx"), LuaValue::Integer(9));
    assert_eq!(state.global_value("mn"), LuaValue::Float(-1.5));
    assert_eq!(state.global_value("t1").as_str(), Some("integer"));
    assert_eq!(state.global_value("t2").as_str(), Some("float"));
    assert!(state.global_value("t3").is_nil());
    assert_eq!(state.global_value("ti"), LuaValue::Integer(3));
    assert!(state.global_value("tf").is_nil());
    assert_eq!(state.global_value("pi_ok"), LuaValue::Boolean(true));
    assert_eq!(state.global_value("huge"), LuaValue::Boolean(true));
    assert_eq!(state.global_value("minint"), LuaValue::Integer(i64::MIN));

    assert_eq!(
        run_err("math.max()"),
        "[string]:1: bad argument #1 to 'max' (number expected, got no value)"
    );
    assert_eq!(
        run_err("math.floor('x')"),
        "[string]:1: bad argument #1 to 'floor' (number expected, got string)"
    );
}
