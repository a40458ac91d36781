//! End-to-end scope resolution over indexes built from statement streams.

use fortac_common::Statement;
use fortac_indexer::error::IndexError;
use fortac_indexer::{
    FortranType, Index, IndexerOptions, ScopeResolver, build_index, search_index_for_type,
    search_index_for_var, search_scope_for_procedure, search_scope_for_var,
};

/// One statement per non-empty line, as the preprocessor would emit them.
fn statements(source: &str) -> Vec<Statement> {
    source
        .lines()
        .map(str::trim)
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(i, line)| Statement::new("test.f90", i as u32 + 1, true, line))
        .collect()
}

fn index_of(source: &str) -> Index {
    build_index(&statements(source), &IndexerOptions::default()).unwrap()
}

const GEOMETRY_SOURCE: &str = r"
    module constants
    implicit none
    real(8), parameter :: pi = 3.141592653589793d0
    real(8), parameter :: two_pi = 6.283185307179586d0
    end module

    module geometry
    use constants, only: pi, tau => two_pi
    implicit none
    type :: vec3
    real(8) :: x
    real(8) :: y
    real(8) :: z
    end type
    type(vec3) :: origin
    end module

    program main
    use geometry
    implicit none
    type(vec3) :: p
    end program
";

#[test]
fn whole_module_import_is_transitively_visible() {
    let index = index_of(GEOMETRY_SOURCE);
    let mut resolver = ScopeResolver::new(IndexerOptions::default());

    // `main` sees `geometry`'s definitions and, through it, the selective
    // imports `geometry` took from `constants`.
    for name in ["p", "origin", "pi", "tau"] {
        let var = search_index_for_var(&mut resolver, &index, "main", name).unwrap();
        assert_eq!(var.name, name);
    }
    let vec3 = search_index_for_type(&mut resolver, &index, "main", "vec3").unwrap();
    assert_eq!(vec3.variables.len(), 3);
}

#[test]
fn member_chain_resolves_to_member_variable() {
    let index = index_of(GEOMETRY_SOURCE);
    let mut resolver = ScopeResolver::new(IndexerOptions::default());
    let var = search_index_for_var(&mut resolver, &index, "main", "p%x").unwrap();
    assert_eq!(var.f_type, FortranType::Real);
    assert_eq!(var.kind.as_deref(), Some("8"));
    assert_eq!(var.c_type.as_deref(), Some("double"));
}

#[test]
fn selective_import_hides_the_renamed_original() {
    let index = index_of(GEOMETRY_SOURCE);
    let mut resolver = ScopeResolver::new(IndexerOptions::default());

    assert!(search_index_for_var(&mut resolver, &index, "geometry", "tau").is_ok());
    // `two_pi` was imported only under the alias, and `geometry` runs under
    // `implicit none`, so the original name does not resolve.
    let err = search_index_for_var(&mut resolver, &index, "geometry", "two_pi").unwrap_err();
    assert!(matches!(err, IndexError::Lookup { .. }));
}

#[test]
fn identical_tags_yield_identical_scopes() {
    let index = index_of(GEOMETRY_SOURCE);
    let names = |resolver: &mut ScopeResolver| {
        let scope = resolver.create_scope(&index, "main").unwrap();
        scope
            .variables
            .iter()
            .map(|v| v.name.clone())
            .collect::<Vec<_>>()
    };
    let mut fresh_a = ScopeResolver::new(IndexerOptions::default());
    let mut fresh_b = ScopeResolver::new(IndexerOptions::default());
    let first = names(&mut fresh_a);
    assert_eq!(first, names(&mut fresh_b));
    // The cached scope must be indistinguishable from a rebuilt one.
    assert_eq!(first, names(&mut fresh_a));
}

#[test]
fn local_declaration_shadows_import() {
    let index = index_of(
        r"
        module grid
        integer :: n = 64
        end module

        program main
        use grid
        real(8) :: n
        end program
    ",
    );
    let mut resolver = ScopeResolver::new(IndexerOptions::default());
    let var = search_index_for_var(&mut resolver, &index, "main", "n").unwrap();
    assert_eq!(var.f_type, FortranType::Real);
}

#[test]
fn whole_module_renaming_hides_the_original() {
    let index = index_of(
        r"
        module grid
        integer :: nx
        integer :: ny
        end module

        program main
        use grid, nx_local => nx
        implicit none
        end program
    ",
    );
    let mut resolver = ScopeResolver::new(IndexerOptions::default());
    let var = search_index_for_var(&mut resolver, &index, "main", "nx_local").unwrap();
    assert_eq!(var.f_type, FortranType::Integer);
    // The renamed original is inaccessible; the untouched sibling is not.
    assert!(search_index_for_var(&mut resolver, &index, "main", "nx").is_err());
    assert!(search_index_for_var(&mut resolver, &index, "main", "ny").is_ok());
}

#[test]
fn repeated_renaming_imports_keep_every_alias() {
    let index = index_of(
        r"
        module grid
        integer :: a1
        integer :: a2
        integer :: a3
        end module

        program main
        use grid, b1 => a1
        use grid, b2 => a2
        use grid, b3 => a3
        implicit none
        end program
    ",
    );
    let mut resolver = ScopeResolver::new(IndexerOptions::default());
    for alias in ["b1", "b2", "b3"] {
        assert!(
            search_index_for_var(&mut resolver, &index, "main", alias).is_ok(),
            "alias {alias} must resolve"
        );
    }
    // Only the last import of the group leaves its renamed original
    // inaccessible; the earlier imports collapse into selective copies and
    // the final whole-module import re-exposes a1 and a2.
    assert!(search_index_for_var(&mut resolver, &index, "main", "a1").is_ok());
    assert!(search_index_for_var(&mut resolver, &index, "main", "a2").is_ok());
    assert!(search_index_for_var(&mut resolver, &index, "main", "a3").is_err());
}

#[test]
fn use_of_unknown_module_is_an_error() {
    let index = index_of(
        r"
        program main
        use mystery_mod
        end program
    ",
    );
    let mut resolver = ScopeResolver::new(IndexerOptions::default());
    let err = resolver.create_scope(&index, "main").unwrap_err();
    let IndexError::UnresolvedDependency { module, location } = err else {
        panic!("expected an unresolved dependency error, got {err}");
    };
    assert_eq!(module, "mystery_mod");
    // The error names the `use` statement that introduced the edge.
    assert_eq!(location.file.as_ref(), "test.f90");
    assert_eq!(location.line, 3);
}

#[test]
fn ignore_listed_modules_are_skipped_silently() {
    let index = index_of(
        r"
        program main
        use, intrinsic :: iso_c_binding
        use cudafor
        end program
    ",
    );
    let mut resolver = ScopeResolver::new(IndexerOptions::default());
    assert!(resolver.create_scope(&index, "main").is_ok());
}

#[test]
fn top_level_procedures_are_visible_from_any_scope() {
    let index = index_of(
        r"
        subroutine helper(x)
        real(8) :: x
        end subroutine

        program main
        implicit none
        end program
    ",
    );
    let mut resolver = ScopeResolver::new(IndexerOptions::default());
    let scope = resolver.create_scope(&index, "main").unwrap();
    let proc = search_scope_for_procedure(&scope, "helper").unwrap();
    assert_eq!(proc.dummy_args.as_slice(), ["x"]);
}

#[test]
fn nested_scope_sees_enclosing_declarations() {
    let index = index_of(
        r"
        module sim
        implicit none
        integer :: step_count
        contains
        subroutine advance(dt)
        real(8) :: dt
        end subroutine
        end module
    ",
    );
    let mut resolver = ScopeResolver::new(IndexerOptions::default());
    let scope = resolver.create_scope(&index, "sim:advance").unwrap();
    assert!(search_scope_for_var(&scope, "step_count").is_ok());
    assert!(search_scope_for_var(&scope, "dt").is_ok());
    // `implicit none` on the module applies to the contained subroutine.
    assert!(search_scope_for_var(&scope, "undeclared").is_err());
}

#[test]
fn device_procedure_snippet_is_captured() {
    let index = index_of(
        r"
        module kernels
        implicit none
        contains
        attributes(global) subroutine saxpy(n, a, x, y)
        integer :: n
        real :: a
        real :: x(n)
        real :: y(n)
        end subroutine
        subroutine host_only(n)
        integer :: n
        end subroutine
        end module
    ",
    );
    let kernels = index.top_level_by_name("kernels").unwrap();
    let subs = &index.get(kernels).subprograms;
    assert_eq!(subs.len(), 2);

    let saxpy = index.get(subs[0]);
    assert!(saxpy.is_device_callable());
    assert!(saxpy.statements.first().is_some_and(|s| s.contains("saxpy")));
    assert!(saxpy.statements.last().is_some_and(|s| s.contains("end")));

    // Host procedures have no re-emission need, so no snippet is kept.
    assert!(index.get(subs[1]).statements.is_empty());
}

#[test]
fn derived_type_snippet_is_captured() {
    let index = index_of(GEOMETRY_SOURCE);
    let mut resolver = ScopeResolver::new(IndexerOptions::default());
    let vec3 = search_index_for_type(&mut resolver, &index, "geometry", "vec3").unwrap();
    assert_eq!(vec3.statements.len(), 5);
    assert!(vec3.statements[0].contains("vec3"));
}

#[test]
fn acc_routine_marks_the_open_procedure_device_callable() {
    let index = index_of(
        r"
        subroutine interpolate(a, b, t)
        !$acc routine seq
        real(8) :: a
        real(8) :: b
        real(8) :: t
        end subroutine
    ",
    );
    let id = index.top_level_by_name("interpolate").unwrap();
    let record = index.get(id);
    assert!(record.is_device_callable());
    assert!(record.attributes.iter().any(|a| a == "host"));
}

#[test]
fn executable_statements_do_not_become_declarations() {
    let index = index_of(
        r"
        program main
        implicit none
        integer :: doubled
        integer :: integer_count
        doubled = 2
        integer_count = integer_count + 1
        typed_value = 1
        end program
    ",
    );
    let id = index.top_level_by_name("main").unwrap();
    let names: Vec<&str> = index
        .get(id)
        .variables
        .iter()
        .map(|v| v.name.as_str())
        .collect();
    assert_eq!(names, ["doubled", "integer_count"]);
    // `typed_value = 1` must not have opened a derived type either.
    assert!(index.get(id).types.is_empty());
}

#[test]
fn mismatched_end_statement_is_a_classification_error() {
    let err = build_index(
        &statements(
            r"
            module broken
            end subroutine
        ",
        ),
        &IndexerOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, IndexError::Classification { .. }));
    assert!(err.to_string().contains("broken"));
}

#[test]
fn unterminated_scope_is_a_classification_error() {
    let err = build_index(
        &statements("module dangling"),
        &IndexerOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("unterminated module 'dangling'"));
}
