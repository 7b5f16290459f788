mod fixtures;

use anyhow::{Context, Result};
use exepatch_core::pe::PeKind;
use exepatch_core::{
    ByteSource, Error, Format, OperatingSystem, PeEditor, Platform, ProcessorIsa, Session,
};
use fixtures::{build_pe, PeFixture};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn with_delay_loads() -> PeFixture {
    PeFixture {
        delay_imports: vec!["dbghelp.dll".to_string(), "VERSION.dll".to_string()],
        ..PeFixture::default()
    }
}

/// Output of a fresh session over `bytes` after running `edit` `times` times.
fn serialize_after(
    bytes: &[u8],
    times: usize,
    edit: impl Fn(&mut PeEditor<'_>) -> exepatch_core::Result<()>,
) -> Result<Vec<u8>> {
    let mut session = Session::open(bytes.to_vec())?;
    let mut editor = session.pe_editor().context("not a PE")?;
    for _ in 0..times {
        edit(&mut editor)?;
    }
    Ok(session.serialize()?)
}

#[test]
fn open_reports_imports_and_platform() -> Result<()> {
    init();
    let (bytes, _) = build_pe(&with_delay_loads());
    let session = Session::open(bytes)?;

    assert_eq!(session.format(), Format::Pe);
    assert!(session.elf().is_none());
    assert_eq!(
        session.needed_shared_libraries()?,
        ["KERNEL32.dll", "USER32.dll", "dbghelp.dll", "VERSION.dll"]
    );
    assert!(session.run_path()?.is_empty());
    assert_eq!(
        session.platform(),
        Platform::new(OperatingSystem::Windows, Format::Pe, ProcessorIsa::X86_64)
    );
    assert!(!session.platform().supports_rpath());
    assert!(session.is_executable_or_shared_library());
    assert!(session.header().is_executable());
    assert!(!session.contains_debug_symbols());

    let pe = session.pe().context("not a PE")?;
    assert_eq!(pe.header.optional.kind, PeKind::Pe32Plus);
    assert!(!pe.is_dll());
    assert_eq!(pe.delay_imports.len(), 2);
    let sections: Vec<_> = session
        .sections()
        .into_iter()
        .map(|s| (s.name, s.vma))
        .collect();
    let text = (".text".to_string(), 0x1000);
    let idata = (".idata".to_string(), 0x2000);
    assert_eq!(sections, [text, idata]);
    Ok(())
}

#[test]
fn zero_edits_round_trip() -> Result<()> {
    init();
    for plus in [true, false] {
        let (bytes, _) = build_pe(&PeFixture {
            plus,
            ..with_delay_loads()
        });
        assert_eq!(Session::open(bytes.clone())?.serialize()?, bytes);
    }
    Ok(())
}

#[test]
fn rename_imported_dll_in_place() -> Result<()> {
    init();
    let (bytes, layout) = build_pe(&PeFixture::default());
    let mut session = Session::open(bytes.clone())?;

    let mut editor = session.pe_editor().context("not a PE")?;
    // "USER32.dll" reserves 11 bytes
    editor.set_imported_dll_name(1, "USER64.dll")?;
    assert!(matches!(
        editor.set_imported_dll_name(1, "USER32long.dll"),
        Err(Error::InsufficientSpace {
            required: 15,
            capacity: 11,
            ..
        })
    ));
    let missing = editor.set_imported_dll_name(2, "x.dll");
    assert!(matches!(missing, Err(Error::EntryNotFound { .. })));
    assert_eq!(editor.imported_dlls()?, ["KERNEL32.dll", "USER64.dll"]);

    let out = session.serialize()?;
    let name = layout.name_offsets[1] as usize;
    let changed: Vec<usize> = bytes
        .iter()
        .zip(&out)
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(changed, [name + 4, name + 5]);

    let goblin = goblin::pe::PE::parse(&out)?;
    assert_eq!(goblin.libraries, ["KERNEL32.dll", "USER64.dll"]);
    Ok(())
}

#[test]
fn dll_name_capacity_boundary() -> Result<()> {
    init();
    let (bytes, layout) = build_pe(&PeFixture::default());
    let mut session = Session::open(bytes)?;

    let mut editor = session.pe_editor().context("not a PE")?;
    editor.set_imported_dll_name(1, "GDI32X.dll")?;
    assert!(matches!(
        editor.set_imported_dll_name(1, "COMCTL3.dll"),
        Err(Error::InsufficientSpace {
            required: 12,
            capacity: 11,
            ..
        })
    ));
    assert_eq!(editor.imported_dlls()?, ["KERNEL32.dll", "GDI32X.dll"]);

    let out = session.serialize()?;
    let name = layout.name_offsets[1] as usize;
    assert_eq!(&out[name..name + 11], b"GDI32X.dll\0");
    Ok(())
}

#[test]
fn repeating_a_rename_matches_applying_it_once() -> Result<()> {
    init();
    fn rename_user32(editor: &mut PeEditor<'_>) -> exepatch_core::Result<()> {
        editor.set_imported_dll_name(1, "USER64.dll")
    }

    let (bytes, _) = build_pe(&with_delay_loads());
    let once = serialize_after(&bytes, 1, rename_user32)?;
    let twice = serialize_after(&bytes, 2, rename_user32)?;
    assert_eq!(once, twice);
    assert_ne!(once, bytes);
    Ok(())
}

#[test]
fn shorter_name_is_nul_padded() -> Result<()> {
    init();
    let (bytes, layout) = build_pe(&PeFixture::default());
    let mut session = Session::open(bytes)?;
    let mut editor = session.pe_editor().context("not a PE")?;
    editor.set_imported_dll_name(0, "K32.dll")?;

    let out = session.serialize()?;
    let name = layout.name_offsets[0] as usize;
    assert_eq!(&out[name..name + 13], b"K32.dll\0\0\0\0\0\0");
    let needed = Session::open(out)?.needed_shared_libraries()?;
    assert_eq!(needed, ["K32.dll", "USER32.dll"]);
    Ok(())
}

#[test]
fn rename_delay_loaded_dll() -> Result<()> {
    init();
    let (bytes, _) = build_pe(&with_delay_loads());
    let mut session = Session::open(bytes)?;

    let mut editor = session.pe_editor().context("not a PE")?;
    editor.set_delay_loaded_dll_name(0, "dbgcore.dll")?;
    assert!(matches!(
        editor.set_delay_loaded_dll_name(1, "VERSION_LONG.dll"),
        Err(Error::InsufficientSpace { .. })
    ));
    assert_eq!(editor.delay_loaded_dlls()?, ["dbgcore.dll", "VERSION.dll"]);

    let out = session.serialize()?;
    let reopened = Session::open(out)?;
    let pe = reopened.pe().context("not a PE")?;
    let delayed = pe.delay_loaded_dlls(reopened.raw().as_bytes())?;
    assert_eq!(delayed, ["dbgcore.dll", "VERSION.dll"]);
    Ok(())
}

#[test]
fn pe32_dll_with_debug_directory() -> Result<()> {
    init();
    let fixture = PeFixture {
        plus: false,
        machine: 0x14c,
        // EXECUTABLE_IMAGE | 32BIT_MACHINE | DLL
        characteristics: 0x2102,
        debug_directory: true,
        ..PeFixture::default()
    };
    let (bytes, _) = build_pe(&fixture);
    let session = Session::open(bytes)?;

    let pe = session.pe().context("not a PE")?;
    assert_eq!(pe.header.optional.kind, PeKind::Pe32);
    assert_eq!(pe.header.optional.image_base, 0x40_0000);
    assert!(pe.is_dll());
    assert!(pe.has_debug_directory());
    assert!(session.contains_debug_symbols());
    assert!(!session.header().is_64());
    assert!(!session.header().is_executable());
    assert!(session.is_executable_or_shared_library());
    assert_eq!(session.platform().processor_isa, ProcessorIsa::X86_32);
    Ok(())
}
