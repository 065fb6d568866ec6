//! Cross-module symbol lookup.

mod common;

use common::*;
use slsvc_core::source::{StaticModule, StaticSource};
use slsvc_core::symbol::{EXIT_SYMBOL, INIT_SYMBOL, SELF_SYMBOL, VERSION_SYMBOL};
use slsvc_core::{
    Export, LoadError, LoaderError, MODULE_VERSION_CODE, ModuleId, ModuleImage, ModuleSource,
    NoopConfigurator, Runtime, SymbolError,
};

static NICK_TABLE: [u8; 4] = [1, 2, 3, 4];
static CHAN_TABLE: [u8; 4] = [5, 6, 7, 8];

fn addr<T>(value: &'static T) -> usize {
    value as *const T as usize
}

#[test]
fn scoped_lookup_stays_in_one_module() {
    let rt = runtime(vec![
        module("nickserv/main").export("account_table", Export::Opaque(addr(&NICK_TABLE))),
        module("chanserv/main"),
    ]);
    let nickserv = rt.load_module("nickserv/main").unwrap();
    let chanserv = rt.load_module("chanserv/main").unwrap();

    assert_eq!(rt.lookup_address(Some(nickserv), "account_table"), addr(&NICK_TABLE));
    assert!(matches!(
        rt.lookup_checked(Some(chanserv), "account_table"),
        Err(SymbolError::NotFound(ref name)) if name == "account_table"
    ));
    assert!(matches!(rt.lookup(Some(nickserv), SELF_SYMBOL), Some(Export::Slot(_))));
}

#[test]
fn global_lookup_prefers_newest_module() {
    let rt = runtime(vec![
        module("old").export("table", Export::Opaque(addr(&NICK_TABLE))),
        module("new").export("table", Export::Opaque(addr(&CHAN_TABLE))),
    ]);
    rt.load_module("old").unwrap();
    let new = rt.load_module("new").unwrap();

    assert_eq!(rt.lookup_address(None, "table"), addr(&CHAN_TABLE));
    rt.unload_module(new).unwrap();
    assert_eq!(rt.lookup_address(None, "table"), addr(&NICK_TABLE));
}

#[test]
fn null_symbol_is_distinct_from_missing() {
    let rt = runtime(vec![module("misc/null").export("nothing", Export::Opaque(0))]);
    let id = rt.load_module("misc/null").unwrap();

    assert!(matches!(rt.lookup_checked(Some(id), "nothing"), Ok(Export::Opaque(0))));
    assert!(rt.lookup_checked(Some(id), "absent").is_err());
    assert_eq!(rt.lookup_address(Some(id), "nothing"), 0);
    assert_eq!(rt.lookup_address(Some(id), "absent"), 0);
}

#[test]
fn unloaded_modules_are_not_searched() {
    let rt = runtime(vec![module("misc/x").export("x", Export::Opaque(1))]);
    let id = rt.load_module("misc/x").unwrap();
    rt.unload_module(id).unwrap();

    assert!(matches!(
        rt.lookup_checked(Some(id), "x"),
        Err(SymbolError::NoSuchModule(gone)) if gone == id
    ));
    assert!(rt.lookup(None, "x").is_none());
    assert!(rt.lookup(Some(ModuleId::CORE), "x").is_none());
}

/// Static table pretending every image shares one global symbol scope.
struct GlobalScope(StaticSource);

impl ModuleSource for GlobalScope {
    fn kind(&self) -> &'static str {
        "global"
    }

    fn open(&self, identifier: &str) -> Result<Box<dyn ModuleImage>, LoaderError> {
        self.0.open(identifier)
    }

    fn shared_namespace(&self) -> bool {
        true
    }
}

static SECOND_VERSION: u32 = MODULE_VERSION_CODE;

fn second_init(_rt: &Runtime, _me: ModuleId) -> bool {
    true
}

fn second_exit(_rt: &Runtime, _me: ModuleId, _shutdown: bool) -> bool {
    true
}

#[test]
fn symbols_leaked_from_loaded_modules_are_ignored() {
    let first_slot = leak_slot();
    let first = StaticModule::entry_points("first", first_slot, ok_init, ok_exit)
        .export("helper", Export::Opaque(addr(&NICK_TABLE)));
    let second = StaticModule::new("second")
        .export(SELF_SYMBOL, Export::Slot(leak_slot()))
        .export(VERSION_SYMBOL, Export::Version(&SECOND_VERSION))
        .export(INIT_SYMBOL, Export::Init(second_init))
        .export(EXIT_SYMBOL, Export::Exit(second_exit))
        .export("helper", Export::Opaque(addr(&NICK_TABLE)));
    // Resolves to the first module's slot, as a global scope would.
    let impostor = StaticModule::entry_points("impostor", first_slot, second_init, second_exit);

    let source = GlobalScope(StaticSource::new(vec![first, second, impostor]));
    let rt = Runtime::new(Box::new(source), Box::new(NoopConfigurator));
    let first = rt.load_module("first").unwrap();
    let second = rt.load_module("second").unwrap();

    assert_eq!(rt.lookup_address(Some(first), "helper"), addr(&NICK_TABLE));
    assert!(rt.lookup(Some(second), "helper").is_none());
    assert_eq!(rt.lookup_address(None, "helper"), addr(&NICK_TABLE));

    assert!(matches!(
        rt.load_module("impostor"),
        Err(LoadError::MissingSymbol { symbol, .. }) if symbol == SELF_SYMBOL
    ));
}
